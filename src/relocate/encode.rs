//! Directory-name encoding for project paths.
//!
//! The assistant stores sessions under `projects/<encoded>/`, where every
//! character outside `[A-Za-z0-9]` becomes `-`. The mapping is many-to-one
//! (`/a/b-c` and `/a/b/c` share a directory) and must stay that way: the
//! directory names already on disk were produced by this exact rule.

pub fn encode_project_path(path: &str) -> String {
    path.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::encode_project_path;

    #[test]
    fn encodes_recorded_directory_names() {
        assert_eq!(
            encode_project_path("/Users/joon/Desktop/old_project"),
            "-Users-joon-Desktop-old-project"
        );
        assert_eq!(encode_project_path("/tmp/p"), "-tmp-p");
        assert_eq!(encode_project_path("relative"), "relative");
        assert_eq!(encode_project_path(""), "");
    }

    #[test]
    fn non_ascii_characters_become_single_hyphens() {
        let input = "/Users/joon/Desktop/10_프로젝트/개발";
        let out = encode_project_path(input);
        assert_eq!(out, "-Users-joon-Desktop-10--------");
        assert_eq!(out.chars().count(), input.chars().count());
    }

    #[test]
    fn output_is_alphanumeric_or_hyphen_and_length_preserving() {
        for input in ["/a/b c/d.e", "C:\\work\\x", "~/.claude", "-already-ok-", "é/ü"] {
            let out = encode_project_path(input);
            assert_eq!(out.chars().count(), input.chars().count(), "{input}");
            assert!(
                out.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'),
                "{input}"
            );
            assert_eq!(encode_project_path(&out), out);
        }
    }

    #[test]
    fn separator_and_hyphen_variants_collide() {
        assert_eq!(encode_project_path("/a/b-c"), encode_project_path("/a/b/c"));
        assert_eq!(encode_project_path("/a/b_c"), encode_project_path("/a/b.c"));
    }
}

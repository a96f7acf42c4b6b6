use crate::relocate::RunMode;
use crate::relocate::util::file_sha256;
use anyhow::{Context, Result};
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Where pristine copies go before a record file is first rewritten.
#[derive(Debug, Clone)]
pub struct BackupTarget {
    pub backup_root: PathBuf,
    pub projects_dir: PathBuf,
}

impl BackupTarget {
    pub fn backup_path_for(&self, file: &Path) -> PathBuf {
        match file.strip_prefix(&self.projects_dir) {
            Ok(rel) => self.backup_root.join(rel),
            Err(_) => self
                .backup_root
                .join(file.file_name().unwrap_or(file.as_os_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub sha256: String,
    pub created: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RewriteOutcome {
    pub changed: bool,
    pub lines_rewritten: usize,
    pub backup: Option<BackupRecord>,
}

/// Maps `value` onto `new` when it is `old` itself or lies beneath it.
/// `/a/bextra` is not beneath `/a/b`.
pub fn apply_prefix_mapping(value: &str, old: &str, new: &str) -> Option<String> {
    if old.is_empty() || old == new {
        return None;
    }
    if value == old {
        return Some(new.to_string());
    }
    let rest = value.strip_prefix(old)?;
    if rest.starts_with('/') {
        Some(format!("{new}{rest}"))
    } else {
        None
    }
}

fn split_line_ending(line: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = line.strip_suffix(b"\r\n") {
        (body, b"\r\n")
    } else if let Some(body) = line.strip_suffix(b"\n") {
        (body, b"\n")
    } else {
        (line, b"")
    }
}

/// Byte span of the top-level `cwd` string in one JSON object line, with its
/// decoded value. Only the object structure is validated; other values are
/// skipped without being decoded, so oversized numbers never fail the line.
/// A duplicated key resolves to its last occurrence.
pub fn locate_cwd(text: &str) -> Option<(Range<usize>, String)> {
    let fields: HashMap<String, &RawValue> = serde_json::from_str(text).ok()?;
    let raw = fields.get("cwd")?.get();
    let cwd: String = serde_json::from_str(raw).ok()?;
    let start = (raw.as_ptr() as usize).checked_sub(text.as_ptr() as usize)?;
    Some((start..start + raw.len(), cwd))
}

fn rewrite_line(body: &[u8], old: &str, new: &str) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(body).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    let (span, cwd) = locate_cwd(text)?;
    let next = apply_prefix_mapping(&cwd, old, new)?;
    let quoted = serde_json::to_string(&next).ok()?;

    let mut out = Vec::with_capacity(body.len() + quoted.len());
    out.extend_from_slice(&body[..span.start]);
    out.extend_from_slice(quoted.as_bytes());
    out.extend_from_slice(&body[span.end..]);
    Some(out)
}

/// Rewrites the `cwd` of every parseable line. Returns `None` when no line
/// changes. Only the `cwd` string itself is replaced; every other byte of a
/// rewritten line stays as it was. Lines that are blank, not UTF-8, not a
/// JSON object, or carry no string `cwd` are kept byte for byte, as are line
/// endings.
pub fn rewrite_lines(content: &[u8], old: &str, new: &str) -> Option<(Vec<u8>, usize)> {
    let mut out = Vec::with_capacity(content.len());
    let mut rewritten = 0usize;
    for line in content.split_inclusive(|b| *b == b'\n') {
        let (body, ending) = split_line_ending(line);
        match rewrite_line(body, old, new) {
            Some(next) => {
                out.extend_from_slice(&next);
                out.extend_from_slice(ending);
                rewritten += 1;
            }
            None => out.extend_from_slice(line),
        }
    }
    if rewritten == 0 {
        None
    } else {
        Some((out, rewritten))
    }
}

/// Copies `file` to `backup_path` unless a backup is already there. The copy
/// lands under a temp name first so a torn copy is never mistaken for a
/// finished backup.
fn backup_once(file: &Path, backup_path: &Path) -> Result<bool> {
    if backup_path.exists() {
        return Ok(false);
    }
    let parent = backup_path
        .parent()
        .with_context(|| format!("backup path has no parent: {}", backup_path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let mut source =
        fs::File::open(file).with_context(|| format!("failed to open {}", file.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    io::copy(&mut source, tmp.as_file_mut())
        .with_context(|| format!("failed to copy {} for backup", file.display()))?;
    tmp.as_file().sync_all()?;
    match tmp.persist_noclobber(backup_path) {
        Ok(_) => Ok(true),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(err.error)
            .with_context(|| format!("failed to write backup {}", backup_path.display())),
    }
}

fn replace_contents(file: &Path, content: &[u8]) -> Result<()> {
    let parent = file
        .parent()
        .with_context(|| format!("record file has no parent: {}", file.display()))?;
    let permissions = fs::metadata(file)
        .with_context(|| format!("failed to stat {}", file.display()))?
        .permissions();

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(content)
        .with_context(|| format!("failed to write temp file for {}", file.display()))?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(file)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", file.display()))?;
    Ok(())
}

/// Rewrites `cwd` fields under `old` to `new` inside one session record file.
/// In apply mode the pristine file is backed up first (once per backup
/// root), then replaced whole. Dry-run only reports whether it would change.
pub fn rewrite_record_cwds(
    file: &Path,
    old: &str,
    new: &str,
    backups: &BackupTarget,
    mode: RunMode,
) -> Result<RewriteOutcome> {
    let original = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let Some((rewritten, lines_rewritten)) = rewrite_lines(&original, old, new) else {
        return Ok(RewriteOutcome::default());
    };

    if mode == RunMode::DryRun {
        return Ok(RewriteOutcome {
            changed: true,
            lines_rewritten,
            backup: None,
        });
    }

    let backup_path = backups.backup_path_for(file);
    let created = backup_once(file, &backup_path)?;
    let sha256 = file_sha256(&backup_path)?;
    replace_contents(file, &rewritten)?;

    Ok(RewriteOutcome {
        changed: true,
        lines_rewritten,
        backup: Some(BackupRecord {
            path: backup_path,
            sha256,
            created,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    fn cwd_of(line: &str) -> String {
        let value: Value = serde_json::from_str(line).expect("json line");
        value["cwd"].as_str().expect("cwd").to_string()
    }

    #[test]
    fn prefix_mapping_is_bounded_by_separator() {
        assert_eq!(
            apply_prefix_mapping("/a/b", "/a/b", "/a/b-new").as_deref(),
            Some("/a/b-new")
        );
        assert_eq!(
            apply_prefix_mapping("/a/b/extra", "/a/b", "/a/b-new").as_deref(),
            Some("/a/b-new/extra")
        );
        assert_eq!(apply_prefix_mapping("/a/bextra", "/a/b", "/a/b-new"), None);
        assert_eq!(apply_prefix_mapping("/x/a/b", "/a/b", "/a/b-new"), None);
        assert_eq!(apply_prefix_mapping("/a/b", "", "/z"), None);
    }

    #[test]
    fn rewrite_lines_keeps_untouched_lines_verbatim() {
        let content = concat!(
            "{\"cwd\":\"/old/proj\",\"other\":1}\n",
            "\n",
            "not json at all\n",
            "[\"array\",\"line\"]\n",
            "{\"cwd\":\"/old/projects\"}\n",
            "{ \"type\": \"summary\" }\n",
            "{\"cwd\":\"/old/proj/sub\",\"z\":true,\"a\":false}\r\n",
            "{\"cwd\":\"/old/proj\"}"
        );
        let (out, n) = rewrite_lines(content.as_bytes(), "/old/proj", "/new/proj").expect("changed");
        assert_eq!(n, 3);
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines[0], "{\"cwd\":\"/new/proj\",\"other\":1}");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "not json at all");
        assert_eq!(lines[3], "[\"array\",\"line\"]");
        assert_eq!(lines[4], "{\"cwd\":\"/old/projects\"}");
        assert_eq!(lines[5], "{ \"type\": \"summary\" }");
        assert_eq!(lines[6], "{\"cwd\":\"/new/proj/sub\",\"z\":true,\"a\":false}\r");
        assert_eq!(cwd_of(lines[7]), "/new/proj");
    }

    #[test]
    fn rewrite_lines_passes_invalid_utf8_through() {
        let mut content = b"{\"cwd\":\"/old\"}\n".to_vec();
        content.extend_from_slice(&[0xff, 0xfe, b'\n']);
        let (out, n) = rewrite_lines(&content, "/old", "/new").expect("changed");
        assert_eq!(n, 1);
        assert!(out.ends_with(&[0xff, 0xfe, b'\n']));
    }

    #[test]
    fn rewrite_keeps_other_fields_byte_for_byte() {
        let content = concat!(
            "{\"cwd\": \"/old/proj\", \"other\": 1}\n",
            "{\"cwd\":\"/old\",\"id\":123456789012345678901234567890,\"f\":1.50,\"e\":1e400}\n",
            "{ \"msg\": \"caf\\u00e9\", \"cwd\" : \"/old/a\" ,\"n\":-0.0 }\n",
        );
        let (out, n) = rewrite_lines(content.as_bytes(), "/old", "/new").expect("changed");
        assert_eq!(n, 3);
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            concat!(
                "{\"cwd\": \"/new/proj\", \"other\": 1}\n",
                "{\"cwd\":\"/new\",\"id\":123456789012345678901234567890,\"f\":1.50,\"e\":1e400}\n",
                "{ \"msg\": \"caf\\u00e9\", \"cwd\" : \"/new/a\" ,\"n\":-0.0 }\n",
            )
        );
    }

    #[test]
    fn locate_cwd_ignores_nested_and_non_string_values() {
        assert_eq!(locate_cwd("{\"meta\":{\"cwd\":\"/x\"}}"), None);
        assert_eq!(locate_cwd("{\"cwd\":42}"), None);
        assert_eq!(locate_cwd("[\"cwd\"]"), None);
        assert_eq!(locate_cwd("{\"cwd\":\"/a\""), None);

        let line = "{\"cwd\":\"/first\",\"cwd\":\"/sec\\/ond\"}";
        let (span, cwd) = locate_cwd(line).expect("cwd");
        assert_eq!(cwd, "/sec/ond");
        assert_eq!(&line[span], "\"/sec\\/ond\"");
    }

    #[test]
    fn unchanged_file_is_left_alone() {
        let tmp = tempdir().expect("tempdir");
        let projects = tmp.path().join("projects");
        let file = projects.join("-p/s.jsonl");
        fs::create_dir_all(file.parent().unwrap()).expect("mkdir");
        fs::write(&file, "{\"cwd\":\"/elsewhere\"}\n").expect("write");
        let backups = BackupTarget {
            backup_root: tmp.path().join("backups"),
            projects_dir: projects,
        };

        let out =
            rewrite_record_cwds(&file, "/old", "/new", &backups, RunMode::Apply).expect("rewrite");
        assert!(!out.changed);
        assert!(!tmp.path().join("backups").exists());
        assert_eq!(
            fs::read_to_string(&file).expect("read"),
            "{\"cwd\":\"/elsewhere\"}\n"
        );
    }

    #[test]
    fn dry_run_reports_change_without_writing() {
        let tmp = tempdir().expect("tempdir");
        let projects = tmp.path().join("projects");
        let file = projects.join("-p/s.jsonl");
        fs::create_dir_all(file.parent().unwrap()).expect("mkdir");
        fs::write(&file, "{\"cwd\":\"/old\"}\n").expect("write");
        let backups = BackupTarget {
            backup_root: tmp.path().join("backups"),
            projects_dir: projects,
        };

        let out = rewrite_record_cwds(&file, "/old", "/new", &backups, RunMode::DryRun)
            .expect("rewrite");
        assert!(out.changed);
        assert!(out.backup.is_none());
        assert_eq!(fs::read_to_string(&file).expect("read"), "{\"cwd\":\"/old\"}\n");
        assert!(!tmp.path().join("backups").exists());
    }

    #[test]
    fn backup_is_written_once_with_pristine_content() {
        let tmp = tempdir().expect("tempdir");
        let projects = tmp.path().join("projects");
        let file = projects.join("-new-proj/s.jsonl");
        fs::create_dir_all(file.parent().unwrap()).expect("mkdir");
        let pristine = "{\"cwd\":\"/old/proj\"}\n{\"cwd\":\"/old/proj/a\"}\n";
        fs::write(&file, pristine).expect("write");
        let backups = BackupTarget {
            backup_root: tmp.path().join("backups"),
            projects_dir: projects.clone(),
        };

        let first = rewrite_record_cwds(&file, "/old/proj", "/mid/proj", &backups, RunMode::Apply)
            .expect("first");
        let backup = first.backup.expect("backup");
        assert!(backup.created);
        assert_eq!(backup.path, tmp.path().join("backups/-new-proj/s.jsonl"));

        let second =
            rewrite_record_cwds(&file, "/mid/proj", "/new/proj", &backups, RunMode::Apply)
                .expect("second");
        let second_backup = second.backup.expect("backup");
        assert!(!second_backup.created);
        assert_eq!(second_backup.sha256, backup.sha256);

        assert_eq!(fs::read_to_string(&backup.path).expect("read backup"), pristine);
        let entries: Vec<_> = fs::read_dir(tmp.path().join("backups/-new-proj"))
            .expect("read backups")
            .collect();
        assert_eq!(entries.len(), 1);

        let current = fs::read_to_string(&file).expect("read");
        let cwds: Vec<String> = current.lines().map(cwd_of).collect();
        assert_eq!(cwds, vec!["/new/proj", "/new/proj/a"]);
    }

    #[cfg(unix)]
    #[test]
    fn replaced_file_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().expect("tempdir");
        let projects = tmp.path().join("projects");
        let file = projects.join("-p/s.jsonl");
        fs::create_dir_all(file.parent().unwrap()).expect("mkdir");
        fs::write(&file, "{\"cwd\":\"/old\"}\n").expect("write");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).expect("chmod");
        let backups = BackupTarget {
            backup_root: tmp.path().join("backups"),
            projects_dir: projects,
        };

        rewrite_record_cwds(&file, "/old", "/new", &backups, RunMode::Apply).expect("rewrite");
        let mode = fs::metadata(&file).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}

use crate::relocate::encode::encode_project_path;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub old_path: String,
    pub new_path: String,
    pub old_dir: PathBuf,
    pub new_dir: PathBuf,
}

impl Candidate {
    /// Old and new paths encode to the same directory; nothing to merge.
    pub fn shares_project_dir(&self) -> bool {
        self.old_dir == self.new_dir
    }
}

/// Keeps only mappings that can be checked against the disk: the encoded old
/// project dir must exist as a directory and the new project path must exist
/// on the host. Everything else is dropped without comment.
pub fn resolve_candidates(
    mapping: &BTreeMap<String, String>,
    projects_dir: &Path,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (old_path, new_path) in mapping {
        let old_dir = projects_dir.join(encode_project_path(old_path));
        if !old_dir.is_dir() {
            continue;
        }
        if !Path::new(new_path).exists() {
            continue;
        }
        out.push(Candidate {
            old_path: old_path.clone(),
            new_path: new_path.clone(),
            old_dir,
            new_dir: projects_dir.join(encode_project_path(new_path)),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn mapping_for(old: &Path, new: &Path) -> BTreeMap<String, String> {
        let mut mapping = BTreeMap::new();
        mapping.insert(old.display().to_string(), new.display().to_string());
        mapping
    }

    #[test]
    fn candidate_requires_old_project_dir_and_real_destination() {
        for (old_dir_present, new_path_present) in
            [(false, false), (false, true), (true, false), (true, true)]
        {
            let tmp = tempdir().expect("tempdir");
            let projects = tmp.path().join("projects");
            fs::create_dir_all(&projects).expect("mkdir projects");
            let old = tmp.path().join("old/proj");
            let new = tmp.path().join("new/proj");

            if old_dir_present {
                fs::create_dir_all(projects.join(encode_project_path(&old.display().to_string())))
                    .expect("mkdir old project dir");
            }
            if new_path_present {
                fs::create_dir_all(&new).expect("mkdir new path");
            }

            let got = resolve_candidates(&mapping_for(&old, &new), &projects);
            if old_dir_present && new_path_present {
                assert_eq!(got.len(), 1);
                assert_eq!(
                    got[0].new_dir,
                    projects.join(encode_project_path(&new.display().to_string()))
                );
            } else {
                assert!(
                    got.is_empty(),
                    "old_dir_present={old_dir_present} new_path_present={new_path_present}"
                );
            }
        }
    }

    #[test]
    fn old_project_entry_that_is_a_file_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let projects = tmp.path().join("projects");
        fs::create_dir_all(&projects).expect("mkdir projects");
        let old = tmp.path().join("old");
        let new = tmp.path().join("new");
        fs::create_dir_all(&new).expect("mkdir new");
        fs::write(projects.join(encode_project_path(&old.display().to_string())), "")
            .expect("write file");

        assert!(resolve_candidates(&mapping_for(&old, &new), &projects).is_empty());
    }

    #[test]
    fn candidates_follow_old_path_order() {
        let tmp = tempdir().expect("tempdir");
        let projects = tmp.path().join("projects");
        let mut mapping = BTreeMap::new();
        for name in ["b", "a", "c"] {
            let old = format!("/gone/{name}");
            fs::create_dir_all(projects.join(encode_project_path(&old))).expect("mkdir");
            let new = tmp.path().join(name);
            fs::create_dir_all(&new).expect("mkdir new");
            mapping.insert(old, new.display().to_string());
        }
        let got = resolve_candidates(&mapping, &projects);
        let olds: Vec<&str> = got.iter().map(|c| c.old_path.as_str()).collect();
        assert_eq!(olds, vec!["/gone/a", "/gone/b", "/gone/c"]);
    }
}

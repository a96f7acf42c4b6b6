use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(claude_dir: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    let base = claude_dir.or_else(|| home_dir.map(|home| home.join(".claude")))?;
    Some(base.join("ccmigrate/.env"))
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("CLAUDE_CONFIG_DIR").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn fallback_uses_claude_config_dir_when_set() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/workspace/.claude")),
            Some(PathBuf::from("/home/alice")),
        );
        assert_eq!(got, Some(PathBuf::from("/workspace/.claude/ccmigrate/.env")));
    }

    #[test]
    fn fallback_uses_home_claude_dir_when_unset() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/alice")));
        assert_eq!(got, Some(PathBuf::from("/home/alice/.claude/ccmigrate/.env")));
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

fn rust_sources(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            rust_sources(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
    Ok(())
}

// `env::var`, `env::var_os` and the crate's `env_*` lookup helpers.
fn is_env_reader(callee: &str) -> bool {
    callee.ends_with("env::var")
        || callee.ends_with("env::var_os")
        || callee.rsplit("::").next().is_some_and(|f| f.starts_with("env_"))
}

fn is_key_byte(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte.is_ascii_digit() || byte == b'_'
}

/// Environment keys passed as a string literal first argument to an env reader.
fn env_reads(source: &str) -> BTreeSet<String> {
    let bytes = source.as_bytes();
    let mut keys = BTreeSet::new();
    for (open, _) in source.match_indices("(\"") {
        let callee_start = bytes[..open]
            .iter()
            .rposition(|b| !(b.is_ascii_alphanumeric() || *b == b'_' || *b == b':'))
            .map_or(0, |p| p + 1);
        if !is_env_reader(&source[callee_start..open]) {
            continue;
        }
        let key_start = open + 2;
        let key_len = bytes[key_start..]
            .iter()
            .take_while(|b| is_key_byte(**b))
            .count();
        if key_len > 0 && bytes.get(key_start + key_len) == Some(&b'"') {
            keys.insert(source[key_start..key_start + key_len].to_string());
        }
    }
    keys
}

fn write_env_reads() -> std::io::Result<()> {
    let mut sources = Vec::new();
    rust_sources(Path::new("src"), &mut sources)?;
    sources.sort();

    let mut readers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for file in &sources {
        let Ok(content) = fs::read_to_string(file) else {
            continue;
        };
        let module = file
            .strip_prefix("src")
            .unwrap_or(file)
            .display()
            .to_string()
            .replace('\\', "/")
            .trim_start_matches('/')
            .to_string();
        for key in env_reads(&content) {
            readers.entry(key).or_default().insert(module.clone());
        }
    }

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let mut f = fs::File::create(Path::new(&out_dir).join("env_reads.rs"))?;
    writeln!(f, "/// (key, source files reading it), one entry per key.")?;
    writeln!(f, "pub const ENV_READS: &[(&str, &str)] = &[")?;
    for (key, modules) in readers {
        let modules = modules.into_iter().collect::<Vec<_>>().join(",");
        writeln!(f, "    ({key:?}, {modules:?}),")?;
    }
    writeln!(f, "];")?;
    Ok(())
}

fn main() {
    write_env_reads().expect("failed to generate env read table");

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    println!(
        "cargo:rustc-env=BUILD_UUID={:x}-{:x}",
        now.as_secs(),
        now.subsec_nanos()
    );
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}

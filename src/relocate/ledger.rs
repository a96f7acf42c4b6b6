use anyhow::{Context, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const PAIR_REASON: &str = "cli --pair";

const HEADER: [&str; 4] = ["src", "dst", "kind", "reason"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveKind {
    Dir,
    Other(String),
}

impl MoveKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "dir" => Self::Dir,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Dir => "dir",
            Self::Other(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub old_path: String,
    pub new_path: String,
    pub kind: MoveKind,
    pub reason: String,
}

impl MoveRecord {
    pub fn manual_pair(old_path: &str, new_path: &str) -> Self {
        Self {
            old_path: strip_trailing_separator(old_path),
            new_path: strip_trailing_separator(new_path),
            kind: MoveKind::Dir,
            reason: PAIR_REASON.to_string(),
        }
    }
}

fn strip_trailing_separator(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}

/// Splits CSV text into rows of fields. Quoted fields may contain commas,
/// doubled quotes and line breaks; rows with no content at all are dropped.
fn parse_csv_rows(raw: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut row_has_content = false;
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }

        match ch {
            '"' => {
                in_quotes = true;
                row_has_content = true;
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                row_has_content = true;
            }
            '\r' | '\n' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                if row_has_content {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
                row_has_content = false;
            }
            _ => {
                field.push(ch);
                row_has_content = true;
            }
        }
    }

    if row_has_content {
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Parses a move ledger. The first row names the columns; `src`, `dst` and
/// `kind` are required per row, `reason` is optional.
pub fn parse_moves_csv(raw: &str) -> Vec<MoveRecord> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut rows = parse_csv_rows(raw).into_iter();
    let Some(header) = rows.next() else {
        return Vec::new();
    };

    let column = |name: &str| header.iter().position(|h| h.trim() == name);
    let (Some(src_col), Some(dst_col), Some(kind_col)) =
        (column("src"), column("dst"), column("kind"))
    else {
        return Vec::new();
    };
    let reason_col = column("reason");

    let mut out = Vec::new();
    for row in rows {
        let cell = |idx: usize| row.get(idx).map(|v| v.trim()).unwrap_or("");
        let src = cell(src_col);
        let dst = cell(dst_col);
        let kind = cell(kind_col);
        if src.is_empty() || dst.is_empty() || kind.is_empty() {
            continue;
        }
        out.push(MoveRecord {
            old_path: strip_trailing_separator(src),
            new_path: strip_trailing_separator(dst),
            kind: MoveKind::parse(kind),
            reason: reason_col.map(cell).unwrap_or("").to_string(),
        });
    }
    out
}

pub fn read_moves_csv(path: &Path) -> Result<Vec<MoveRecord>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_moves_csv(&String::from_utf8_lossy(&bytes)))
}

fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

pub fn write_moves_csv(records: &[MoveRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut out = HEADER.join(",");
    out.push('\n');
    for record in records {
        let fields = [
            csv_field(&record.old_path),
            csv_field(&record.new_path),
            csv_field(record.kind.as_str()),
            csv_field(&record.reason),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Directory moves only, keyed by old path; later records win.
pub fn build_dir_mapping(records: &[MoveRecord]) -> BTreeMap<String, String> {
    records
        .iter()
        .filter(|r| r.kind == MoveKind::Dir)
        .map(|r| (r.old_path.clone(), r.new_path.clone()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct LedgerSources {
    pub moves: PathBuf,
    pub corrections: PathBuf,
    pub pairs: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct MoveLedger {
    pub mapping: BTreeMap<String, String>,
    pub pair_records: Vec<MoveRecord>,
    pub moves_present: bool,
    pub corrections_present: bool,
}

impl MoveLedger {
    /// Base ledger, then corrections, then manual pairs; each layer overrides
    /// the previous one for the same old path. Missing files contribute nothing.
    pub fn load(sources: &LedgerSources) -> Result<Self> {
        let mut ledger = MoveLedger::default();

        if sources.moves.is_file() {
            ledger.moves_present = true;
            let records = read_moves_csv(&sources.moves)?;
            ledger.mapping.extend(build_dir_mapping(&records));
        }

        if sources.corrections.is_file() {
            ledger.corrections_present = true;
            let records = read_moves_csv(&sources.corrections)?;
            ledger.mapping.extend(build_dir_mapping(&records));
        }

        ledger.pair_records = sources
            .pairs
            .iter()
            .map(|(old, new)| MoveRecord::manual_pair(old, new))
            .collect();
        ledger.mapping.extend(build_dir_mapping(&ledger.pair_records));

        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_drops_incomplete_rows_and_strips_trailing_slashes() {
        let raw = "src,dst,kind,reason\n\
                   /a/old/,/a/new/,dir,cleanup\n\
                   ,/x,dir,missing src\n\
                   /y,,dir,missing dst\n\
                   /z,/w,,missing kind\n\
                   /f.txt,/g.txt,file,\n";
        let records = parse_moves_csv(raw);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].old_path, "/a/old");
        assert_eq!(records[0].new_path, "/a/new");
        assert_eq!(records[0].kind, MoveKind::Dir);
        assert_eq!(records[0].reason, "cleanup");
        assert_eq!(records[1].kind, MoveKind::Other("file".to_string()));
    }

    #[test]
    fn parse_handles_quotes_crlf_bom_and_column_order() {
        let raw = "\u{feff}kind,reason,dst,src\r\n\
                   dir,\"moved, then \"\"renamed\"\"\",\"/b/new, dir\",/b/old\r\n\
                   \r\n";
        let records = parse_moves_csv(raw);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].old_path, "/b/old");
        assert_eq!(records[0].new_path, "/b/new, dir");
        assert_eq!(records[0].reason, "moved, then \"renamed\"");
    }

    #[test]
    fn quoted_fields_may_span_lines() {
        let raw = concat!(
            "src,dst,kind,reason\n",
            "\"/a/odd\nname\",/c,dir,\"split\r\nacross, lines\"\r\n",
            "\n",
            "/d,/e,dir,plain\n",
        );
        let records = parse_moves_csv(raw);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].old_path, "/a/odd\nname");
        assert_eq!(records[0].new_path, "/c");
        assert_eq!(records[0].reason, "split\r\nacross, lines");
        assert_eq!(records[1].old_path, "/d");
        assert_eq!(records[1].reason, "plain");
    }

    #[test]
    fn parse_without_required_header_yields_nothing() {
        assert!(parse_moves_csv("old,new\n/a,/b\n").is_empty());
        assert!(parse_moves_csv("").is_empty());
    }

    #[test]
    fn dir_mapping_ignores_other_kinds_and_last_row_wins() {
        let records = parse_moves_csv(
            "src,dst,kind,reason\n/a,/b,dir,\n/a,/c,dir,\n/d,/e,file,\n",
        );
        let mapping = build_dir_mapping(&records);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("/a").map(String::as_str), Some("/c"));
    }

    #[test]
    fn manual_pairs_beat_corrections_which_beat_base() {
        let tmp = tempdir().expect("tempdir");
        let moves = tmp.path().join("moves.csv");
        let corrections = tmp.path().join("moves_corrections.csv");
        fs::write(
            &moves,
            "src,dst,kind,reason\n/p,/base,dir,\n/q,/base-q,dir,\n/r,/base-r,dir,\n",
        )
        .expect("write moves");
        fs::write(
            &corrections,
            "src,dst,kind,reason\n/p,/corrected,dir,\n/q,/corrected-q,dir,\n",
        )
        .expect("write corrections");

        let ledger = MoveLedger::load(&LedgerSources {
            moves,
            corrections,
            pairs: vec![("/p/".to_string(), "/manual".to_string())],
        })
        .expect("load");

        assert!(ledger.moves_present);
        assert!(ledger.corrections_present);
        assert_eq!(ledger.mapping.get("/p").map(String::as_str), Some("/manual"));
        assert_eq!(
            ledger.mapping.get("/q").map(String::as_str),
            Some("/corrected-q")
        );
        assert_eq!(ledger.mapping.get("/r").map(String::as_str), Some("/base-r"));
        assert_eq!(ledger.pair_records[0].reason, PAIR_REASON);
    }

    #[test]
    fn missing_ledger_files_load_as_empty() {
        let tmp = tempdir().expect("tempdir");
        let ledger = MoveLedger::load(&LedgerSources {
            moves: tmp.path().join("absent.csv"),
            corrections: tmp.path().join("absent_corrections.csv"),
            pairs: Vec::new(),
        })
        .expect("load");
        assert!(!ledger.moves_present);
        assert!(!ledger.corrections_present);
        assert!(ledger.mapping.is_empty());
    }

    #[test]
    fn written_pairs_read_back_with_quoting() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("run/pairs.csv");
        let records = vec![MoveRecord::manual_pair("/a,b", "/c \"d\"")];
        write_moves_csv(&records, &path).expect("write");
        assert_eq!(read_moves_csv(&path).expect("read"), records);
    }
}

//! JSONL storage: one JSON value per line.
//!
//! Full rewrites go through a temp file, fsync and rename, so readers only
//! ever see the old or the new file. Appends are single `write` calls of one
//! complete line followed by fsync.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Read rows from a JSONL reader. Blank lines and `#` comments are skipped.
pub fn read_rows<T: DeserializeOwned>(reader: impl BufRead) -> Result<Vec<T>, JsonlError> {
    let mut rows = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| JsonlError::Io(line_no + 1, e.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let row: T = serde_json::from_str(trimmed)
            .map_err(|e| JsonlError::Parse(line_no + 1, e.to_string()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Write rows to a JSONL writer.
pub fn write_rows<T: Serialize>(writer: &mut impl Write, rows: &[T]) -> Result<(), JsonlError> {
    for row in rows {
        let line = encode_line(row)?;
        writer
            .write_all(line.as_bytes())
            .map_err(|e| JsonlError::Io(0, e.to_string()))?;
    }
    Ok(())
}

fn encode_line<T: Serialize>(row: &T) -> Result<String, JsonlError> {
    let mut line = serde_json::to_string(row).map_err(|e| JsonlError::Serialize(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Read rows from a JSONL file. A missing file reads as empty.
pub fn read_rows_from_path<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, JsonlError> {
    let path = path.as_ref();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(JsonlError::Io(0, format!("{}: {e}", path.display()))),
    };
    validate_substrate_bytes(path, &bytes)?;
    read_rows(BufReader::new(bytes.as_slice()))
}

/// Replace a JSONL file atomically.
pub fn write_rows_to_path<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<(), JsonlError> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> Result<(), JsonlError> {
        let file = File::create(&tmp_path)
            .map_err(|e| JsonlError::Io(0, format!("{}: {e}", tmp_path.display())))?;
        let mut writer = BufWriter::new(file);
        write_rows(&mut writer, rows)?;
        writer
            .flush()
            .map_err(|e| JsonlError::Io(0, format!("{}: {e}", tmp_path.display())))?;
        let file = writer
            .into_inner()
            .map_err(|e| JsonlError::Io(0, format!("{}: {e}", tmp_path.display())))?;
        file.sync_all()
            .map_err(|e| JsonlError::Io(0, format!("{}: {e}", tmp_path.display())))?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        JsonlError::Io(
            0,
            format!("{} -> {}: {e}", tmp_path.display(), path.display()),
        )
    })?;

    sync_parent(path)
}

/// Append one row as a single line.
pub fn append_row_to_path<T: Serialize>(path: impl AsRef<Path>, row: &T) -> Result<(), JsonlError> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let line = encode_line(row)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| JsonlError::Io(0, format!("{}: {e}", path.display())))?;
    file.write_all(line.as_bytes())
        .map_err(|e| JsonlError::Io(0, format!("{}: {e}", path.display())))?;
    file.sync_all()
        .map_err(|e| JsonlError::Io(0, format!("{}: {e}", path.display())))
}

fn ensure_parent(path: &Path) -> Result<(), JsonlError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| JsonlError::Io(0, format!("{parent:?}: {e}")))?;
    }
    Ok(())
}

fn sync_parent(path: &Path) -> Result<(), JsonlError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        let dir = File::open(parent)
            .map_err(|e| JsonlError::Io(0, format!("{}: {e}", parent.display())))?;
        dir.sync_all()
            .map_err(|e| JsonlError::Io(0, format!("{}: {e}", parent.display())))?;
    }
    Ok(())
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}

fn validate_substrate_bytes(path: &Path, bytes: &[u8]) -> Result<(), JsonlError> {
    if bytes.contains(&0) {
        return Err(JsonlError::Corrupt(format!(
            "{}: contains NUL byte(s)",
            path.display()
        )));
    }
    if std::str::from_utf8(bytes).is_err() {
        return Err(JsonlError::Corrupt(format!(
            "{}: contains non-UTF-8 byte sequence(s)",
            path.display()
        )));
    }
    Ok(())
}

/// Errors from JSONL operations.
#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("line {0}: I/O error: {1}")]
    Io(usize, String),

    #[error("line {0}: parse error: {1}")]
    Parse(usize, String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("corrupted store file: {0}")]
    Corrupt(String),
}

#[cfg(test)]
pub(crate) fn temp_path(prefix: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "dfr-store-{prefix}-{}-{unique}/rows.jsonl",
        std::process::id()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Line {
        id: u32,
        note: String,
    }

    fn cleanup(path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let path = temp_path("missing");
        let rows: Vec<Line> = read_rows_from_path(&path).expect("missing file is empty");
        assert!(rows.is_empty());
    }

    #[test]
    fn rejects_nul_payload() {
        let path = temp_path("nul");
        ensure_parent(&path).expect("parent");
        fs::write(&path, b"{\"id\":1,\"note\":\"a\"}\n\0garbage").expect("fixture should write");

        match read_rows_from_path::<Line>(&path) {
            Err(JsonlError::Corrupt(message)) => assert!(message.contains("contains NUL")),
            other => panic!("expected corrupt store error, got {other:?}"),
        }
        cleanup(&path);
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let path = temp_path("parse");
        ensure_parent(&path).expect("parent");
        fs::write(&path, "{\"id\":1,\"note\":\"a\"}\n\n{broken\n").expect("fixture should write");

        match read_rows_from_path::<Line>(&path) {
            Err(JsonlError::Parse(line, _)) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }
        cleanup(&path);
    }

    #[test]
    fn rewrite_replaces_and_append_extends() {
        let path = temp_path("rewrite");
        write_rows_to_path(&path, &[Line { id: 1, note: "first".into() }]).expect("first write");
        write_rows_to_path(&path, &[Line { id: 2, note: "second".into() }]).expect("second write");
        append_row_to_path(&path, &Line { id: 3, note: "third".into() }).expect("append");

        let rows: Vec<Line> = read_rows_from_path(&path).expect("read back");
        assert_eq!(
            rows,
            vec![
                Line { id: 2, note: "second".into() },
                Line { id: 3, note: "third".into() }
            ]
        );
        cleanup(&path);
    }
}

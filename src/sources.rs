//! Payload directories.
//!
//! Source payloads are downloaded ahead of time into one directory per
//! source, one JSON file per item. Files are read in file-name order; a file
//! that fails to parse is logged and skipped.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::warn;

/// JSON files directly inside `dir`, sorted by file name.
pub fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed reading directory: {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parses one JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parses every JSON file in `dir`, skipping malformed ones.
pub fn read_payloads<T: DeserializeOwned>(dir: &Path) -> Result<Vec<(PathBuf, T)>> {
    let mut payloads = Vec::new();
    for path in json_files(dir)? {
        match read_json(&path) {
            Ok(payload) => payloads.push((path, payload)),
            Err(e) => warn!(file = %path.display(), error = %format!("{:#}", e), "skipping payload"),
        }
    }
    Ok(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Deserialize)]
    struct Item {
        n: u32,
    }

    #[test]
    fn test_read_payloads_sorted_and_skips_malformed() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("2.json"), r#"{"n": 2}"#).unwrap();
        fs::write(tmp.path().join("1.json"), r#"{"n": 1}"#).unwrap();
        fs::write(tmp.path().join("3.json"), "{broken").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(tmp.path().join("nested.json")).unwrap();

        let items: Vec<(PathBuf, Item)> = read_payloads(tmp.path()).unwrap();
        let ns: Vec<u32> = items.iter().map(|(_, i)| i.n).collect();
        assert_eq!(ns, vec![1, 2]);
    }

    #[test]
    fn test_missing_directory() {
        let err = json_files(Path::new("/definitely/not/here")).unwrap_err();
        assert!(err.to_string().contains("Failed reading directory"));
    }
}

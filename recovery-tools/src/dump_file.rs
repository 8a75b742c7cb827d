//! Reads the dump file named by spec.md §6 "Environment": a text file, one
//! key per line in hex form.

use std::path::Path;

use anyhow::Context;

use recovery_core::dump::DumpRecord;

/// Parse every non-blank line of `path` as a [`DumpRecord`].
pub fn load(path: &Path) -> anyhow::Result<Vec<DumpRecord>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading dump file {}", path.display()))?;
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse()
                .map(|key| DumpRecord { key })
                .with_context(|| format!("parsing key {line:?} in dump file {}", path.display()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.txt");
        let key = "ab".repeat(64);
        std::fs::write(&path, format!("{key}\n\n{key}\n")).unwrap();

        let records = load(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn rejects_malformed_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.txt");
        std::fs::write(&path, "not-a-key\n").unwrap();
        assert!(load(&path).is_err());
    }
}

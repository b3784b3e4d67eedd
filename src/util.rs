use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn run_id_for(prefix: &str, ts: DateTime<Utc>) -> String {
    format!("{prefix}-{}", ts.format("%Y%m%dT%H%M%SZ"))
}

/// Reads a whole data file and returns its text alongside the sha256 of the raw bytes.
pub fn read_text_with_digest(path: &Path) -> Result<(String, String)> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let digest = format!("{:x}", Sha256::digest(&raw));
    let text = String::from_utf8(raw)
        .with_context(|| format!("file is not valid UTF-8: {}", path.display()))?;

    Ok((text, digest))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_text_with_digest_hashes_raw_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sample.json");
        fs::write(&path, "abc").expect("write sample");

        let (text, digest) = read_text_with_digest(&path).expect("read sample");
        assert_eq!(text, "abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn run_id_uses_compact_utc_timestamp() {
        let ts = DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        assert_eq!(run_id_for("merge", ts), "merge-20240305T070809Z");
    }
}

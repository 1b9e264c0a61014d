//! Legacy stdout scraping: pull the device key line out of huami-token's
//! textual output and materialize it as a single text file.
//!
//! Extraction is fixed-marker substring search on the first matching line
//! only. That breaks on reordered fields or localized output; it is kept
//! as-is and isolated here so the file-discovery mode can replace it
//! without touching the scheduler or dispatcher.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Device identity extracted from the tool's stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceKeyRecord {
    pub mac: String,
    pub key: String,
    pub active: String,
    pub generated_at: DateTime<Local>,
}

/// Scan stdout for the first line carrying `Device`, `MAC:` and `Key:`
/// markers and extract the labeled fields.
pub fn parse_device_key(stdout: &str, generated_at: DateTime<Local>) -> Option<DeviceKeyRecord> {
    let line = stdout
        .lines()
        .find(|l| l.contains("Device") && l.contains("MAC:") && l.contains("Key:"))?;

    let mac = until_comma(after_marker(line, "MAC:")?);
    let key = after_marker(line, "Key:")?.trim();
    let active = until_comma(after_marker(line, "Active:")?);

    Some(DeviceKeyRecord {
        mac: mac.to_string(),
        key: key.to_string(),
        active: active.to_string(),
        generated_at,
    })
}

/// Write the record as `huami_token_<timestamp>.txt` inside `dir`.
pub fn write_record_file(record: &DeviceKeyRecord, dir: &Path) -> std::io::Result<PathBuf> {
    let stamp = record.generated_at.format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("huami_token_{stamp}.txt"));

    let content = format!(
        "Huami Token Information\n\
         Generated: {}\n\
         Device MAC: {}\n\
         Active: {}\n\
         Bluetooth Key: {}\n",
        record.generated_at.to_rfc3339(),
        record.mac,
        record.active,
        record.key,
    );
    std::fs::write(&path, content)?;
    Ok(path)
}

fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let start = line.find(marker)? + marker.len();
    Some(&line[start..])
}

fn until_comma(s: &str) -> &str {
    s.split(',').next().unwrap_or(s).trim()
}

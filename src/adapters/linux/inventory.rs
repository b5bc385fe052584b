//! `lsblk --json` parsing.

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::error::PrimitiveError;
use crate::core::hardware::{BlockDevice, PrimitiveResult};

pub(super) const LSBLK_ARGS: [&str; 5] = [
    "--json",
    "--nodeps",
    "--bytes",
    "--output",
    "NAME,PATH,MODEL,SERIAL,VENDOR,TRAN,SIZE,TYPE",
];

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkEntry>,
}

#[derive(Debug, Deserialize)]
struct LsblkEntry {
    name: String,
    path: Option<String>,
    model: Option<String>,
    serial: Option<String>,
    vendor: Option<String>,
    tran: Option<String>,
    // Older util-linux prints sizes as strings even with --bytes.
    size: Option<serde_json::Value>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub(super) fn parse(json: &str) -> PrimitiveResult<Vec<BlockDevice>> {
    let parsed: LsblkOutput = serde_json::from_str(json).map_err(|e| PrimitiveError::Parse {
        program: "lsblk".to_string(),
        detail: e.to_string(),
    })?;

    Ok(parsed
        .blockdevices
        .into_iter()
        .map(|entry| BlockDevice {
            path: entry
                .path
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/dev").join(&entry.name)),
            name: entry.name,
            model: clean(entry.model),
            serial: clean(entry.serial),
            vendor: clean(entry.vendor),
            transport: clean(entry.tran),
            size: entry.size.as_ref().and_then(size_of),
            kind: clean(entry.kind),
        })
        .collect())
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn size_of(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

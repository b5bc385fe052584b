//! Parser for `/proc/self/mounts`.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct MountEntry {
    pub source: PathBuf,
    pub target: PathBuf,
    pub fs_type: String,
}

pub(super) fn parse(table: &str) -> Vec<MountEntry> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                source: PathBuf::from(unescape(source)),
                target: PathBuf::from(unescape(target)),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// The kernel escapes space, tab, newline and backslash as `\ooo`.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            if let Some(value) = octal_byte(&bytes[i + 1..i + 4]) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn octal_byte(digits: &[u8]) -> Option<u8> {
    if !digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
        return None;
    }
    let value = digits
        .iter()
        .fold(0u16, |acc, d| acc * 8 + u16::from(d - b'0'));
    u8::try_from(value).ok()
}

/// Source currently bound at `target`. The last entry wins for stacked mounts.
pub(super) fn bound_at(entries: &[MountEntry], target: &Path) -> Option<PathBuf> {
    entries
        .iter()
        .rev()
        .find(|e| e.target == target)
        .map(|e| e.source.clone())
}

/// Every target whose source is one of `nodes`.
pub(super) fn targets_of(entries: &[MountEntry], nodes: &[PathBuf]) -> Vec<PathBuf> {
    entries
        .iter()
        .filter(|e| nodes.contains(&e.source))
        .map(|e| e.target.clone())
        .collect()
}

//! Plain-text rendering of the device inventory.

use crate::core::hardware::BlockDevice;

const HEADERS: [&str; 6] = ["PATH", "SIZE", "TRAN", "VENDOR", "MODEL", "SERIAL"];

pub fn render_table(devices: &[BlockDevice]) -> String {
    if devices.is_empty() {
        return "No block devices found.\n".to_string();
    }

    let rows: Vec<[String; 6]> = devices
        .iter()
        .map(|d| {
            [
                d.path.display().to_string(),
                d.size.map(human_size).unwrap_or_else(|| "-".to_string()),
                or_dash(&d.transport),
                or_dash(&d.vendor),
                or_dash(&d.model),
                or_dash(&d.serial),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS.map(str::to_string), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

fn or_dash(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_string())
}

/// Decimal units, the way drive vendors label capacity.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

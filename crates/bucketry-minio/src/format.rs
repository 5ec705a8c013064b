//! Human-readable size and duration labels.

use std::time::Duration;

const SIZE_UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];
const SIZE_BASE: f64 = 1024.0;

/// Formats a byte count with 1024-based units, e.g. `0 B`, `1.5 kB`, `1.21 MB`.
///
/// At most two fraction digits are kept, trailing zeros are dropped and the
/// integer part is grouped by thousands.
pub fn readable_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= SIZE_BASE && unit < SIZE_UNITS.len() - 1 {
        size /= SIZE_BASE;
        unit += 1;
    }
    // 1023.999 kB prints as 1,024 kB unless promoted after rounding.
    if unit > 0 && unit < SIZE_UNITS.len() - 1 && (size * 100.0).round() / 100.0 >= SIZE_BASE {
        size /= SIZE_BASE;
        unit += 1;
    }

    let number = if unit == 0 {
        group_thousands(&bytes.to_string())
    } else {
        let fixed = format!("{size:.2}");
        let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            group_thousands(integer)
        } else {
            format!("{}.{fraction}", group_thousands(integer))
        }
    };

    format!("{number} {}", SIZE_UNITS[unit])
}

/// Formats a duration compactly, e.g. `850µs`, `12ms`, `1.25s`, `2m 5s`, `1h 2m`.
pub fn readable_elapsed(elapsed: Duration) -> String {
    if elapsed < Duration::from_millis(1) {
        return format!("{}µs", elapsed.as_micros());
    }
    if elapsed < Duration::from_secs(1) {
        return format!("{}ms", elapsed.as_millis());
    }

    // Hundredths of a second, rounded once so every branch agrees.
    let centis = (elapsed.as_secs_f64() * 100.0).round() as u64;
    let secs = (centis + 50) / 100;
    if centis < 6000 {
        let fixed = format!("{}.{:02}", centis / 100, centis % 100);
        let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
        format!("{trimmed}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

use crate::parser::{Parsed, Range};

/// How a [`Parsed`] record's ranges are shaped, used by callers deciding how
/// to group or display a file (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitClass {
    VolumesOnly,
    ChaptersOnly,
    Mixed,
    Empty,
}

pub fn classify_unit(parsed: &Parsed) -> UnitClass {
    match (parsed.volume_ranges.is_empty(), parsed.chapter_ranges.is_empty()) {
        (false, false) => UnitClass::Mixed,
        (false, true) => UnitClass::VolumesOnly,
        (true, false) => UnitClass::ChaptersOnly,
        (true, true) => UnitClass::Empty,
    }
}

/// Merge adjacent/overlapping ranges, `[a,b]` and `[c,d]` with `a <= c`
/// merging iff `c <= b + 1`, then render a human-readable string such as
/// `v01-03, v07` (§4.3).
pub fn format_ranges(ranges: &[Range], prefix: &str, pad: usize) -> String {
    if ranges.is_empty() {
        return String::new();
    }
    let mut sorted: Vec<Range> = ranges.to_vec();
    sorted.sort_by(|a, b| a.low.partial_cmp(&b.low).unwrap());

    let mut merged: Vec<Range> = Vec::new();
    for range in sorted {
        if let Some(last) = merged.last_mut() {
            if range.low <= last.high + 1.0 {
                last.high = last.high.max(range.high);
                continue;
            }
        }
        merged.push(range);
    }

    merged
        .into_iter()
        .map(|r| render_one(r, prefix, pad))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_one(range: Range, prefix: &str, pad: usize) -> String {
    if range.is_singleton() {
        format!("{prefix}{}", pad_number(range.low, pad))
    } else {
        format!("{prefix}{}-{}", format_number(range.low), format_number(range.high))
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn pad_number(n: f64, pad: usize) -> String {
    if n.fract() == 0.0 {
        format!("{:0width$}", n as i64, width = pad)
    } else {
        format!("{n}")
    }
}

/// Ordered list of missing single values or sub-ranges in `[1, expected_total]`.
/// When `expected_total` is `None`, only internal gaps between the given
/// ranges are reported (§4.3).
pub fn find_gaps(ranges: &[Range], expected_total: Option<u64>) -> Vec<Range> {
    if ranges.is_empty() {
        return match expected_total {
            Some(total) if total > 0 => vec![Range { low: 1.0, high: total as f64 }],
            _ => Vec::new(),
        };
    }

    let mut sorted: Vec<Range> = ranges.to_vec();
    sorted.sort_by(|a, b| a.low.partial_cmp(&b.low).unwrap());
    let mut merged: Vec<Range> = Vec::new();
    for range in sorted {
        if let Some(last) = merged.last_mut() {
            if range.low <= last.high + 1.0 {
                last.high = last.high.max(range.high);
                continue;
            }
        }
        merged.push(range);
    }

    let mut gaps = Vec::new();
    let lower_bound = 1.0_f64;
    let mut cursor = lower_bound;

    for range in &merged {
        if range.low > cursor {
            gaps.push(Range { low: cursor, high: range.low - 1.0 });
        }
        cursor = cursor.max(range.high + 1.0);
    }

    if let Some(total) = expected_total {
        let total = total as f64;
        if cursor <= total {
            gaps.push(Range { low: cursor, high: total });
        }
    }

    gaps
}

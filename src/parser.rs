use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::config::Config;

/// Classification assigned to a parsed filename or torrent title (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Manga,
    LightNovel,
    VisualNovel,
    Audiobook,
    Anthology,
    Periodical,
    Undersized,
}

/// An inclusive `[low, high]` span, possibly carrying a decimal tail (chapter
/// numbers such as `12.5` are legal; volume numbers never are in practice,
/// but nothing in the type distinguishes them).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

impl Range {
    pub fn singleton(n: f64) -> Self {
        Self { low: n, high: n }
    }

    pub fn is_singleton(&self) -> bool {
        self.low == self.high
    }
}

/// Structured output of the filename parser (§4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub source: String,
    pub cleaned_title: String,
    pub entry_type: EntryType,
    pub volume_ranges: Vec<Range>,
    pub chapter_ranges: Vec<Range>,
    pub notes: Vec<String>,
}

// ---------------------------------------------------------------------
// Fixed pattern tables
// ---------------------------------------------------------------------

static TYPE_PATTERNS: Lazy<Vec<(EntryType, Regex)>> = Lazy::new(|| {
    let build = |p: &str| RegexBuilder::new(p).case_insensitive(true).build().unwrap();
    vec![
        (EntryType::LightNovel, build(r"light\s*novel|\bln\b|j-novel|web\s*novel")),
        (EntryType::VisualNovel, build(r"visual\s*novel|\bvn\b")),
        (EntryType::Audiobook, build(r"audiobook")),
        (EntryType::Anthology, build(r"archives\s*[a-z]-[a-z]")),
        (EntryType::Periodical, build(r"weekly|alpha manga")),
    ]
});

static EXTENSION_STRIP: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"\.(cbz|cbr|zip|rar|pdf|epub)$")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static TAG_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()]*)\)|\[([^\[\]]*)\]|\{([^{}]*)\}").unwrap());

static SEASON_MARKER: Lazy<Regex> =
    Lazy::new(|| RegexBuilder::new(r"season\s+\d+").case_insensitive(true).build().unwrap());

static VERSION_MARKER: Lazy<Regex> = Lazy::new(|| {
    // "v\d+ appearing outside a volume context": the only unambiguous signal
    // the spec gives is the literal word "version" preceding it.
    RegexBuilder::new(r"\bversion\s*v?\d+\b").case_insensitive(true).build().unwrap()
});

static STANDALONE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}\b").unwrap());

static GENERIC_PROTECTED: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        RegexBuilder::new(r"part\s+\d+").case_insensitive(true).build().unwrap(),
        RegexBuilder::new(r"no\.\s*\d+").case_insensitive(true).build().unwrap(),
    ]
});

static VOLUME_TO_CHAPTER: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"chapters?\s+(\d+)(?:\s*-\s*(\d+))?\s+as\s+(?:vol(?:ume)?\.?|v)\s*(\d+)")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static MESSY_VOLUME: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"v\d+(?:[v_-]\d+)+").case_insensitive(true).build().unwrap()
});

static STANDARD_VOLUME: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        RegexBuilder::new(r"\bv\s*(\d+)(?:\s*-\s*(\d+))?\b").case_insensitive(true).build().unwrap(),
        RegexBuilder::new(r"\bvol(?:ume)?\.?\s*(\d+)(?:\s*-\s*(\d+))?\b")
            .case_insensitive(true)
            .build()
            .unwrap(),
        RegexBuilder::new(r"\bparts?\s*(\d+)(?:\s*-\s*(\d+))?\b")
            .case_insensitive(true)
            .build()
            .unwrap(),
    ]
});

static STANDARD_CHAPTER: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        RegexBuilder::new(r"\bc\s*(\d+(?:\.\d+)?)(?:\s*-\s*(\d+(?:\.\d+)?))?\b")
            .case_insensitive(true)
            .build()
            .unwrap(),
        RegexBuilder::new(r"\bch(?:apter)?\.?\s*(\d+(?:\.\d+)?)(?:\s*-\s*(\d+(?:\.\d+)?))?\b")
            .case_insensitive(true)
            .build()
            .unwrap(),
        // The literal `#` is written as \x23 rather than a bare `#`, matching the
        // verbose-pattern convention the spec calls for even though this builder
        // isn't compiled with the `x` flag.
        RegexBuilder::new(r"\x23\s*(\d+(?:\.\d+)?)(?:\s*-\s*(\d+(?:\.\d+)?))?")
            .build()
            .unwrap(),
    ]
});

static TRAILING_NUMERIC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,+]?\s*(\d+(?:\.\d+)?)(?:\s*-\s*(\d+(?:\.\d+)?))?\s*$").unwrap());

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s.trim(), " ").to_string()
}

/// Reject ranges outside the bounds described in §4.2/§4.4 and log the drop
/// at debug only, per the `ParseWarning` error kind in §7.
fn push_valid_range(ranges: &mut Vec<Range>, low: f64, high: f64, config: &Config) {
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    if low < 0.0 {
        debug!("dropping range [{low}, {high}]: negative endpoint");
        return;
    }
    if high - low > config.max_range_span as f64 {
        debug!("dropping range [{low}, {high}]: span exceeds {}", config.max_range_span);
        return;
    }
    let (y0, y1) = config.year_window;
    let in_year_window = |n: f64| n >= y0 as f64 && n <= y1 as f64;
    if in_year_window(low) || in_year_window(high) {
        debug!("dropping range [{low}, {high}]: endpoint falls in year window");
        return;
    }
    ranges.push(Range { low, high });
}

fn parse_num(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

// ---------------------------------------------------------------------
// Pipeline steps
// ---------------------------------------------------------------------

fn classify_type(source: &str) -> EntryType {
    for (entry_type, pattern) in TYPE_PATTERNS.iter() {
        if pattern.is_match(source) {
            return *entry_type;
        }
    }
    EntryType::Manga
}

fn extract_tags(input: &str) -> (String, Vec<String>) {
    let mut residual = input.to_string();
    let mut notes = Vec::new();
    while let Some(m) = TAG_GROUP.captures(&residual) {
        let whole = m.get(0).unwrap();
        let inner = m
            .get(1)
            .or_else(|| m.get(2))
            .or_else(|| m.get(3))
            .map(|g| g.as_str().trim())
            .unwrap_or("");
        if !inner.is_empty() {
            notes.push(inner.to_string());
        }
        let range = whole.range();
        residual.replace_range(range, " ");
    }
    (residual, notes)
}

fn strip_noise(residual: &str, config: &Config) -> String {
    let mut out = residual.to_string();
    for phrase in &config.noise_phrases {
        if phrase.is_empty() {
            continue;
        }
        let pattern = RegexBuilder::new(&regex::escape(phrase))
            .case_insensitive(true)
            .build()
            .unwrap();
        out = pattern.replace_all(&out, " ").to_string();
    }
    out = SEASON_MARKER.replace_all(&out, " ").to_string();
    out = VERSION_MARKER.replace_all(&out, " ").to_string();
    out
}

/// Remove standalone years so they aren't later mistaken for a naked volume
/// or chapter number. Years that are part of an emerging `N-M` range token
/// are left alone here; oversized ranges are rejected later by
/// [`push_valid_range`] (§4.2 step 4 / range validity).
fn elide_years(residual: &str, config: &Config) -> String {
    let (y0, y1) = config.year_window;
    let bytes = residual.as_bytes();
    let mut out = residual.to_string();
    let matches: Vec<_> = STANDALONE_YEAR.find_iter(residual).collect();
    for m in matches.into_iter().rev() {
        let value: u32 = m.as_str().parse().unwrap_or(0);
        if value < y0 || value > y1 {
            continue;
        }
        let before_is_range_joiner = m.start() > 0 && bytes[m.start() - 1] == b'-';
        let after_is_range_joiner = m.end() < bytes.len() && bytes[m.end()] == b'-';
        if before_is_range_joiner || after_is_range_joiner {
            continue;
        }
        out.replace_range(m.range(), " ");
    }
    out
}

struct Masked {
    text: String,
    restores: Vec<(String, String)>,
}

/// Mask protected numerals before number extraction so they survive into the
/// cleaned title unchanged (§4.2 step 5). Spans are restored in place once
/// numeric extraction is done — restoring into `notes` as the spec's prose
/// literally says would drop text like `No. 8` out of the cleaned title,
/// which contradicts the worked example (`Kaiju No. 8`); see DESIGN.md.
fn mask_protected(residual: &str, config: &Config) -> Masked {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for pattern in GENERIC_PROTECTED.iter() {
        for m in pattern.find_iter(residual) {
            spans.push((m.start(), m.end()));
        }
    }
    for token in &config.protected_tokens {
        if token.is_empty() {
            continue;
        }
        let pattern = RegexBuilder::new(&regex::escape(token))
            .case_insensitive(true)
            .build()
            .unwrap();
        for m in pattern.find_iter(residual) {
            spans.push((m.start(), m.end()));
        }
    }
    spans.sort_by_key(|(start, end)| (*start, std::cmp::Reverse(*end)));

    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in spans {
        if let Some(last) = merged.last_mut() {
            if start < last.1 {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }

    let mut text = residual.to_string();
    let mut restores = Vec::new();
    for (idx, (start, end)) in merged.into_iter().enumerate().rev() {
        let placeholder = format!("\u{1}MASK{idx}\u{1}");
        let original = text[start..end].to_string();
        text.replace_range(start..end, &placeholder);
        restores.push((placeholder, original));
    }
    Masked { text, restores }
}

fn restore_masks(text: &str, restores: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (placeholder, original) in restores {
        out = out.replace(placeholder.as_str(), original);
    }
    out
}

/// If a pipe or bullet separates two candidate title segments, keep the
/// longer (ties broken by ASCII-letter count) and send the other to notes.
/// The "paired bracket" case from §4.2 step 6 is already resolved by tag
/// extraction in step 2, which unconditionally moves bracketed alternate
/// titles into notes.
fn split_dual_language(residual: &str, notes: &mut Vec<String>) -> String {
    for sep in ['|', '\u{2022}'] {
        if let Some(idx) = residual.find(sep) {
            let (left, right) = residual.split_at(idx);
            let right = &right[sep.len_utf8()..];
            let left = left.trim();
            let right = right.trim();
            if left.is_empty() || right.is_empty() {
                return format!("{left}{right}");
            }
            let ascii_letters = |s: &str| s.chars().filter(|c| c.is_ascii_alphabetic()).count();
            let (kept, other) = if right.chars().count() > left.chars().count() {
                (right, left)
            } else if left.chars().count() > right.chars().count() {
                (left, right)
            } else if ascii_letters(right) > ascii_letters(left) {
                (right, left)
            } else {
                (left, right)
            };
            notes.push(other.to_string());
            return kept.to_string();
        }
    }
    residual.to_string()
}

fn apply_volume_to_chapter(
    residual: &str,
    volume_ranges: &mut Vec<Range>,
    chapter_ranges: &mut Vec<Range>,
    config: &Config,
) -> String {
    let mut out = residual.to_string();
    while let Some(m) = VOLUME_TO_CHAPTER.captures(&out) {
        let n = parse_num(&m[1]);
        let high = m.get(2).map(|g| parse_num(g.as_str())).unwrap_or(n);
        let k = parse_num(&m[3]);
        push_valid_range(chapter_ranges, n, high, config);
        push_valid_range(volume_ranges, k, k, config);
        let range = m.get(0).unwrap().range();
        out.replace_range(range, " ");
    }
    out
}

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

fn apply_messy_volume(residual: &str, volume_ranges: &mut Vec<Range>, config: &Config) -> String {
    let mut out = residual.to_string();
    while let Some(m) = MESSY_VOLUME.find(&out) {
        let whole = m.as_str();
        let numbers: Vec<f64> = DIGIT_RUN.find_iter(whole).map(|g| parse_num(g.as_str())).collect();
        if let (Some(&low), Some(&high)) =
            (numbers.iter().min_by(|a, b| a.total_cmp(b)), numbers.iter().max_by(|a, b| a.total_cmp(b)))
        {
            push_valid_range(volume_ranges, low, high, config);
        }
        let range = m.range();
        out.replace_range(range, " ");
    }
    out
}

fn apply_patterned_ranges(residual: &str, patterns: &[Regex], ranges: &mut Vec<Range>, config: &Config) -> String {
    let mut out = residual.to_string();
    for pattern in patterns {
        loop {
            let Some(m) = pattern.captures(&out) else { break };
            let low = parse_num(&m[1]);
            let high = m.get(2).map(|g| parse_num(g.as_str())).unwrap_or(low);
            push_valid_range(ranges, low, high, config);
            let range = m.get(0).unwrap().range();
            out.replace_range(range, " ");
        }
    }
    out
}

fn peel_naked_numbers(residual: &str, volume_ranges: &mut Vec<Range>, config: &Config) -> String {
    let mut out = residual.to_string();
    let mut peeled: Vec<Range> = Vec::new();
    loop {
        let trimmed_len = out.trim_end().len();
        let Some(m) = TRAILING_NUMERIC_TOKEN.find(&out[..trimmed_len]) else { break };
        let remaining_before = out[..m.start()].trim();
        if remaining_before.is_empty() {
            // Peeling would make the residual empty; stop per §4.2 step 11.
            break;
        }
        let captures = TRAILING_NUMERIC_TOKEN.captures(&out[..trimmed_len]).unwrap();
        let low = parse_num(&captures[1]);
        let high = captures.get(2).map(|g| parse_num(g.as_str())).unwrap_or(low);
        peeled.push(Range { low, high });
        out.truncate(m.start());
    }
    for range in peeled.into_iter().rev() {
        push_valid_range(volume_ranges, range.low, range.high, config);
    }
    out
}

fn undersize_if_applicable(
    entry_type: EntryType,
    volume_ranges: &[Range],
    chapter_ranges: &[Range],
    size_bytes: Option<u64>,
    config: &Config,
) -> EntryType {
    if entry_type != EntryType::Manga {
        return entry_type;
    }
    let Some(size) = size_bytes else { return entry_type };
    if !volume_ranges.is_empty() && size < config.undersized_volume_bytes {
        return EntryType::Undersized;
    }
    if volume_ranges.is_empty() && !chapter_ranges.is_empty() && size < config.undersized_chapter_bytes {
        return EntryType::Undersized;
    }
    entry_type
}

/// Parse a raw filename stem or torrent title into a [`Parsed`] record
/// (§4.2). Pure and deterministic: no I/O, no global state.
pub fn parse(source: &str, size_bytes: Option<u64>, config: &Config) -> Parsed {
    let entry_type = classify_type(source);

    let without_extension = EXTENSION_STRIP.replace(source, "").to_string();
    let (residual, mut notes) = extract_tags(&without_extension);
    let residual = strip_noise(&residual, config);
    let residual = elide_years(&residual, config);
    let masked = mask_protected(&residual, config);
    let residual = split_dual_language(&masked.text, &mut notes);

    let mut volume_ranges = Vec::new();
    let mut chapter_ranges = Vec::new();

    let residual = apply_volume_to_chapter(&residual, &mut volume_ranges, &mut chapter_ranges, config);
    let residual = apply_messy_volume(&residual, &mut volume_ranges, config);
    let residual = apply_patterned_ranges(&residual, &STANDARD_VOLUME, &mut volume_ranges, config);
    let residual = apply_patterned_ranges(&residual, &STANDARD_CHAPTER, &mut chapter_ranges, config);
    let residual = peel_naked_numbers(&residual, &mut volume_ranges, config);

    let cleaned_title = collapse_whitespace(&restore_masks(&residual, &masked.restores));

    let entry_type =
        undersize_if_applicable(entry_type, &volume_ranges, &chapter_ranges, size_bytes, config);

    Parsed {
        source: source.to_string(),
        cleaned_title,
        entry_type,
        volume_ranges,
        chapter_ranges,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn empty_string_parses_to_manga_with_nothing() {
        let parsed = parse("", None, &cfg());
        assert_eq!(parsed.entry_type, EntryType::Manga);
        assert!(parsed.volume_ranges.is_empty());
        assert!(parsed.chapter_ranges.is_empty());
        assert!(parsed.notes.is_empty());
    }

    #[test]
    fn volume_parse_scenario_1() {
        let parsed = parse("One Piece v01.cbz", Some(60 * 1024 * 1024), &cfg());
        assert_eq!(parsed.entry_type, EntryType::Manga);
        assert_eq!(parsed.cleaned_title, "One Piece");
        assert_eq!(parsed.volume_ranges, vec![Range { low: 1.0, high: 1.0 }]);
        assert!(parsed.chapter_ranges.is_empty());
        assert!(parsed.notes.is_empty());
    }

    #[test]
    fn range_parse_with_noise_scenario_2() {
        let parsed = parse(
            "[Group] Berserk (2021) v01-03 [Complete].cbz",
            Some(300 * 1024 * 1024),
            &cfg(),
        );
        assert_eq!(parsed.entry_type, EntryType::Manga);
        assert_eq!(parsed.cleaned_title, "Berserk");
        assert_eq!(parsed.volume_ranges, vec![Range { low: 1.0, high: 3.0 }]);
        assert!(parsed.notes.iter().any(|n| n == "Group"));
        assert!(parsed.notes.iter().any(|n| n == "Complete"));
    }

    #[test]
    fn kaiju_exception_scenario_3() {
        let parsed = parse("Kaiju No. 8 v05.cbr", Some(80 * 1024 * 1024), &cfg());
        assert_eq!(parsed.cleaned_title, "Kaiju No. 8");
        assert_eq!(parsed.volume_ranges, vec![Range { low: 5.0, high: 5.0 }]);
        assert!(parsed.chapter_ranges.is_empty());
    }

    #[test]
    fn standalone_year_is_discarded() {
        let parsed = parse("Series v2150", None, &cfg());
        assert!(parsed.volume_ranges.is_empty() || parsed.volume_ranges.iter().all(|r| r.low != 2150.0));
    }

    #[test]
    fn oversized_range_is_discarded_entirely() {
        let parsed = parse("Series c1-2021", None, &cfg());
        assert!(parsed.chapter_ranges.is_empty());
    }

    #[test]
    fn ranges_never_span_more_than_max_and_never_touch_year_window() {
        let samples = ["Long Series v1-400", "Another v5-6", "Chapter c100.5-102"];
        let config = cfg();
        for s in samples {
            let parsed = parse(s, None, &config);
            for range in parsed.volume_ranges.iter().chain(parsed.chapter_ranges.iter()) {
                assert!(range.low <= range.high);
                assert!(range.high - range.low <= config.max_range_span as f64);
                let (y0, y1) = config.year_window;
                assert!(!(range.low >= y0 as f64 && range.low <= y1 as f64));
            }
        }
    }

    #[test]
    fn light_novel_type_detected() {
        let parsed = parse("Some Light Novel v01", None, &cfg());
        assert_eq!(parsed.entry_type, EntryType::LightNovel);
    }

    #[test]
    fn undersized_manga_with_small_volume_file() {
        let parsed = parse("Tiny Series v01", Some(1024), &cfg());
        assert_eq!(parsed.entry_type, EntryType::Undersized);
    }

    #[test]
    fn naked_trailing_number_becomes_a_volume() {
        let parsed = parse("My Hero Academia 5", None, &cfg());
        assert_eq!(parsed.cleaned_title, "My Hero Academia");
        assert_eq!(parsed.volume_ranges, vec![Range { low: 5.0, high: 5.0 }]);
    }
}

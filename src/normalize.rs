use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::decompose_canonical;

static BRACKET_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^()]*\)|\[[^\[\]]*\]|\{[^{}]*\}").unwrap());

static LEADING_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:the|an?|les?|la)\s+").unwrap());

static TRAILING_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*(?:the|an?|les?|la)\s*$").unwrap());

static NON_ALNUM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").unwrap());

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Fold accented Latin characters down to their base letter by canonical
/// decomposition, dropping combining marks. `unidecode`-style transliteration
/// would go further than the spec asks for; this keeps non-Latin scripts
/// (native Japanese titles, etc.) untouched.
fn fold_accents(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        decompose_canonical(c, |d| {
            if !matches!(unicode_general_category(d), CharKind::Mark) {
                out.push(d);
            }
        });
    }
    out
}

enum CharKind {
    Mark,
    Other,
}

/// Cheap substitute for a full Unicode category table: combining marks are
/// exactly the code points in the "Combining Diacritical Marks" block plus
/// the handful of other ranges canonical decomposition actually produces for
/// Latin text. This is sufficient because `fold_accents` only ever sees the
/// decomposition of a single character.
fn unicode_general_category(c: char) -> CharKind {
    let cp = c as u32;
    let is_combining = matches!(cp,
        0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F
    );
    if is_combining { CharKind::Mark } else { CharKind::Other }
}

/// Strip all bracketed groups, innermost first, repeating until none remain.
fn strip_bracket_groups(s: &str) -> String {
    let mut current = s.to_string();
    loop {
        let replaced = BRACKET_GROUP.replace_all(&current, " ").to_string();
        if replaced == current {
            return replaced;
        }
        current = replaced;
    }
}

/// Reduce a title to its canonical comparison key (§4.1).
///
/// Deterministic and idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(title: &str) -> String {
    let folded = fold_accents(title).to_lowercase();
    let stripped = strip_bracket_groups(&folded);
    let no_trailing_article = TRAILING_ARTICLE.replace(&stripped, "");
    let no_leading_article = LEADING_ARTICLE.replace(&no_trailing_article, "");
    let spaced = NON_ALNUM_RUN.replace_all(&no_leading_article, " ");
    WHITESPACE_RUN.replace_all(spaced.trim(), " ").to_string()
}

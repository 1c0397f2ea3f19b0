//! Post-processing: deterministic cleanup of summariser responses.
//!
//! Even a well-prompted model occasionally wraps its answer in a code fence,
//! echoes the section title, or leaves `(Image: ...)` annotations that only
//! make sense to the model. These rules fix such quirks without touching
//! content, and each one is independently testable.
//!
//! `(Equation: E<n>)` annotations are the one kind that carries meaning:
//! [`bullets_with_equations`] reads them before they are removed.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence
//! regex sees a single line terminator; annotations are removed before
//! bullets are split so an annotation never becomes a bullet of its own.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all clean-up rules to a raw response.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Remove `(Equation: ...)`, `(Image: ...)`, `(Table: ...)` annotations
/// 5. Trim each line and drop blank lines
pub fn clean_summary(input: &str) -> String {
    trim_lines(&remove_annotations(&prepare(input)))
}

/// Rules 1 to 3.
fn prepare(input: &str) -> String {
    let s = strip_fences(input);
    let s = normalise_line_endings(&s);
    remove_invisible_chars(&s)
}

fn trim_lines(input: &str) -> String {
    input
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 1: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ──────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Remove model annotations ────────────────────────────────────────

static RE_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*\((?:equation|image|figure|table)\s*:[^()]*(?:\([^()]*\)[^()]*)*\)")
        .unwrap()
});

fn remove_annotations(input: &str) -> String {
    RE_ANNOTATION.replace_all(input, "").to_string()
}

static RE_EQUATION_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*equations?\s*:([^()]*)\)").unwrap());

static RE_EQUATION_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bE(\d{1,3})\b").unwrap());

/// Split a raw response into bullets, each with the equation labels
/// (`"E1"`, `"E2"`, …) it was annotated with.
///
/// Bullets are the same as `parse_bullets(&clean_summary(raw))` yields for
/// marker-led responses. A bullet that is nothing but an annotation hands
/// its labels to the bullet before it.
pub fn bullets_with_equations(raw: &str) -> Vec<(String, Vec<String>)> {
    let mut out: Vec<(String, Vec<String>)> = Vec::new();
    for bullet in parse_bullets(&trim_lines(&prepare(raw))) {
        let mut labels: Vec<String> = Vec::new();
        for caps in RE_EQUATION_REF.captures_iter(&bullet) {
            for label in RE_EQUATION_LABEL.captures_iter(&caps[1]) {
                let label = format!("E{}", &label[1]);
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        let text = remove_annotations(&bullet).trim().to_string();
        if !text.is_empty() {
            out.push((text, labels));
        } else if let Some((_, prev)) = out.last_mut() {
            for label in labels {
                if !prev.contains(&label) {
                    prev.push(label);
                }
            }
        }
    }
    out
}

// ── Bullets ─────────────────────────────────────────────────────────────────

static RE_BULLET_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[•●▪‣◦]|[-*–]|\d{1,2}[.)])(?:\s+|$)").unwrap());

/// Split cleaned text into bullet lines.
///
/// Lines starting with a bullet marker (`•`, `-`, `*`, `1.`) begin a new
/// bullet; unmarked lines continue the previous one. Text with no markers
/// at all falls back to one bullet per sentence.
pub fn parse_bullets(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return Vec::new();
    }

    if !lines.iter().any(|l| RE_BULLET_MARKER.is_match(l)) {
        return split_sentences(&lines.join(" "));
    }

    let mut bullets: Vec<String> = Vec::new();
    for line in lines {
        if let Some(m) = RE_BULLET_MARKER.find(line) {
            let body = line[m.end()..].trim();
            if !body.is_empty() {
                bullets.push(body.to_string());
            }
        } else if let Some(last) = bullets.last_mut() {
            last.push(' ');
            last.push_str(line);
        } else {
            // Preamble before the first marker is a bullet in its own right.
            bullets.push(line.to_string());
        }
    }
    bullets
}

static RE_SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?](?:\s+|$)").unwrap());

/// Split prose into sentences on `.`, `!` or `?` followed by whitespace.
///
/// Decimal points (`41.2`) and abbreviations without a following space are
/// left alone.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in RE_SENTENCE_END.find_iter(text) {
        let sentence = text[start..m.start() + 1].trim();
        if !sentence.is_empty() {
            out.push(sentence.to_string());
        }
        start = m.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

static RE_CAPTION_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\**\s*(?:short\s+|slide\s+)?(?:image\s+|table\s+|figure\s+)?caption\s*\**\s*:\s*\**\s*")
        .unwrap()
});

/// Longest slide caption kept, in words.
const MAX_CAPTION_WORDS: usize = 20;

/// Reduce a caption response to one short line.
///
/// Takes the first non-empty line, drops a bullet marker, a
/// `Caption:`-style prefix and wrapping quotes, and keeps at most
/// twenty words. `None` when nothing is left.
pub fn clean_caption(raw: &str) -> Option<String> {
    let cleaned = clean_summary(raw);
    let line = cleaned.lines().next()?;
    let line = match RE_BULLET_MARKER.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    };
    let line = RE_CAPTION_PREFIX.replace(line.trim(), "");
    let line = line.trim_matches(|c: char| c.is_whitespace() || "\"'“”*_".contains(c));
    let words: Vec<&str> = line.split_whitespace().take(MAX_CAPTION_WORDS).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// First sentence of `text`, without its closing punctuation.
pub fn first_sentence(text: &str) -> Option<String> {
    split_sentences(text).into_iter().next().map(|s| {
        s.trim_end_matches(['.', '!', '?'])
            .trim()
            .to_string()
    })
}

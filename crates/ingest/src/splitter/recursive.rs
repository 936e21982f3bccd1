//! Splitting of blocks that exceed the size limit.
//!
//! Paragraphs first, sentences inside paragraphs that are still too long,
//! then greedy packing with a character overlap between segments.

use std::sync::LazyLock;

use regex::Regex;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence boundary pattern"));

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s` (the whole string when shorter).
pub(crate) fn tail_chars(s: &str, n: usize) -> &str {
    let len = char_len(s);
    if len <= n {
        return s;
    }
    match s.char_indices().nth(len - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Split at `.`, `!` or `?` followed by whitespace. Punctuation stays with
/// its sentence; returns non-empty trimmed fragments.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        // Terminal punctuation is ASCII, so +1 stays on a char boundary.
        let s = text[start..m.start() + 1].trim();
        if !s.is_empty() {
            sentences.push(s);
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// A packable piece of text and the separator that joins it to the piece
/// before it.
struct Unit<'a> {
    text: &'a str,
    sep: &'static str,
}

fn units(text: &str, max_chars: usize) -> Vec<Unit<'_>> {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut out = Vec::new();
    for para in paragraphs {
        if char_len(para) <= max_chars {
            out.push(Unit { text: para, sep: "\n\n" });
            continue;
        }
        for (i, sentence) in split_sentences(para).into_iter().enumerate() {
            out.push(Unit { text: sentence, sep: if i == 0 { "\n\n" } else { " " } });
        }
    }
    out
}

/// Split `text` into segments of at most `max_chars` characters.
///
/// When a segment closes, the next one is seeded with the tail of the
/// closing segment's last unit: the whole unit when it is at most
/// `overlap` characters, else its last `overlap` characters. A seed that
/// does not fit next to the following unit is dropped. A single unit longer
/// than `max_chars` is emitted intact.
pub(crate) fn recursive_split(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let units = units(text, max_chars);
    if units.len() <= 1 {
        return vec![text.to_string()];
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut last_unit: &str = "";

    for unit in units {
        let unit_len = char_len(unit.text);
        let sep_len = char_len(unit.sep);

        if current.is_empty() {
            current.push_str(unit.text);
            current_len = unit_len;
        } else if current_len + sep_len + unit_len <= max_chars {
            current.push_str(unit.sep);
            current.push_str(unit.text);
            current_len += sep_len + unit_len;
        } else {
            segments.push(std::mem::take(&mut current));

            let seed = if overlap > 0 { tail_chars(last_unit, overlap) } else { "" };
            let seed_len = char_len(seed);
            if !seed.is_empty() && seed_len + sep_len + unit_len <= max_chars {
                current.push_str(seed);
                current.push_str(unit.sep);
                current_len = seed_len + sep_len;
            } else {
                current_len = 0;
            }
            current.push_str(unit.text);
            current_len += unit_len;
        }
        last_unit = unit.text;
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

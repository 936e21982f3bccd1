//! Chapter / article header recognition.

use std::sync::LazyLock;

use regex::Regex;

// `Chương I: QUY ĐỊNH CHUNG`, `CHƯƠNG 2`, `Chương IV - ...`
static CHAPTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^chương\s+([IVXLCDM]+|\d+)\b[\s:.\-–]*(.*)$").expect("chapter pattern")
});

// `Điều 5. Phạm vi điều chỉnh`, `ĐIỀU 12`
static ARTICLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^điều\s+(\d+)\b[\s:.\-–]*(.*)$").expect("article pattern")
});

/// A recognized structural header line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Marker {
    pub numeral: String,
    pub title: Option<String>,
}

impl Marker {
    /// `numeral` or `numeral: title`.
    pub fn label(&self) -> String {
        match &self.title {
            Some(title) => format!("{}: {}", self.numeral, title),
            None => self.numeral.clone(),
        }
    }
}

fn capture(re: &Regex, line: &str) -> Option<Marker> {
    let caps = re.captures(line)?;
    let numeral = caps.get(1)?.as_str().to_uppercase();
    let title = caps
        .get(2)
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    Some(Marker { numeral, title })
}

pub(crate) fn chapter(line: &str) -> Option<Marker> {
    capture(&CHAPTER, line)
}

pub(crate) fn article(line: &str) -> Option<Marker> {
    capture(&ARTICLE, line)
}

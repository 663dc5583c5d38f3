use std::sync::LazyLock;

use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

// Class patterns match a single class token; the prefix keeps "update" or
// "background" from reading as date or round labels.
pub static PARTICIPANT_CLASS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)participant"));
pub static SCORE_CLASS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)(^|[_-])(score|result)"));
pub static DATE_CLASS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)(^|[_-])(time|date)"));
pub static ROUND_CLASS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)(^|[_-])(round|stage|phase)"));

pub static COLON_SCORE: LazyLock<Regex> = LazyLock::new(|| compile(r"(\d+)\s*:\s*(\d+)"));
pub static PIPE_SCORE: LazyLock<Regex> = LazyLock::new(|| compile(r"(\d+)\s*\|\s*(\d+)"));
pub static LABELED_SCORE: LazyLock<Regex> = LazyLock::new(|| compile(r"(\d+)\s*[:|\-]\s*(\d+)"));
pub static SCORE_SHAPED: LazyLock<Regex> = LazyLock::new(|| compile(r"^\d+\s*[:\-]\s*\d+$"));

/// `D.M` with an optional two- or four-digit year, as found inside a single segment.
pub static SEGMENT_DATE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(\d{1,2})\.(\d{1,2})(?:\.(\d{4}|\d{2})\b)?"));
pub static FULL_DATE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(\d{1,2})[./](\d{1,2})[./](\d{4})"));
/// Bare `D.M`; the third group flags a trailing year so callers can skip it.
pub static BARE_DAY_MONTH: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(\d{1,2})\.(\d{1,2})(\.\d+)?"));
pub static DATE_PREFIX: LazyLock<Regex> = LazyLock::new(|| compile(r"^\d{1,2}[./]\d{1,2}"));

pub static ORDINAL_PREFIX: LazyLock<Regex> = LazyLock::new(|| compile(r"^\d+\.?\s*"));
pub static SCORE_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| compile(r"\d+\s*[:\-]\s*\d+"));
pub static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| compile(r"^\d{2}:\d{2}$"));

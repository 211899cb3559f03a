//! Type coercion for extracted text.
//!
//! Every function returns `None` on failure. The extractor treats that as
//! "this strategy didn't match" and moves on; no coercion error escapes.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::pipeline::types::FieldValue;

/// How a matched string becomes a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Text,
    /// Like `Text`, but keeps line breaks (message bodies).
    Block,
    Integer,
    Date,
    Amount,
    Currency,
}

impl Coercion {
    pub fn apply(&self, raw: &str) -> Option<FieldValue> {
        match self {
            Self::Text => text(raw).map(FieldValue::Text),
            Self::Block => block(raw).map(FieldValue::Text),
            Self::Integer => integer(raw).map(FieldValue::Integer),
            Self::Date => date(raw).map(FieldValue::Date),
            Self::Amount => amount(raw).map(FieldValue::Amount),
            Self::Currency => currency(raw).map(FieldValue::Text),
        }
    }
}

/// Collapse whitespace; empty strings don't count as a value.
pub fn text(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Trim each line and drop blank lines at either end.
pub fn block(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.lines().map(str::trim).collect();
    let start = lines.iter().position(|l| !l.is_empty())?;
    let end = lines.iter().rposition(|l| !l.is_empty())?;
    Some(lines[start..=end].join("\n"))
}

/// Leading run of ASCII digits.
pub fn integer(raw: &str) -> Option<i64> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Tried in order; day-first wins over month-first for ambiguous slashes.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
];

static JAPANESE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日").unwrap());

static LEADING_WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+").unwrap()
});

/// Parse a calendar date from the layouts notifications use.
pub fn date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim().trim_end_matches(['.', ',']);

    if let Some(caps) = JAPANESE_DATE.captures(trimmed) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    // ISO timestamps from schema.org markup, e.g. 2025-05-01T15:00:00+09:00
    if let Some((day, _)) = trimmed.split_once('T')
        && let Ok(parsed) = NaiveDate::parse_from_str(day, "%Y-%m-%d")
    {
        return Some(parsed);
    }

    let without_weekday = LEADING_WEEKDAY.replace(trimmed, "");
    let candidate = without_weekday.split_whitespace().collect::<Vec<_>>().join(" ");

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&candidate, fmt).ok())
}

static AMOUNT_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d(?:[\d.,]*\d)?").unwrap());

/// Parse the first money amount in `raw`, ignoring currency markers and
/// any trailing text.
///
/// When both `,` and `.` appear, the right-most one is the decimal separator.
/// A lone `,` followed by exactly two digits is a decimal comma; otherwise it
/// groups thousands.
pub fn amount(raw: &str) -> Option<Decimal> {
    let number = AMOUNT_TOKEN.find(raw)?.as_str();

    let normalized = match (number.rfind(','), number.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => number.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => number.replace(',', ""),
        (Some(comma), None) => {
            let decimals = number.len() - comma - 1;
            if decimals == 2 && number.matches(',').count() == 1 {
                number.replace(',', ".")
            } else {
                number.replace(',', "")
            }
        }
        (None, _) => number.to_string(),
    };

    Decimal::from_str(&normalized).ok()
}

/// Normalize a currency symbol or code to its ISO 4217 code.
pub fn currency(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let code = match trimmed {
        "$" | "US$" => "USD",
        "€" => "EUR",
        "£" => "GBP",
        "¥" | "￥" | "円" => "JPY",
        other if other.len() == 3 && other.chars().all(|c| c.is_ascii_alphabetic()) => {
            return Some(other.to_ascii_uppercase());
        }
        _ => return None,
    };
    Some(code.to_string())
}

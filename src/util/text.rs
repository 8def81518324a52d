use std::{collections::HashSet, str::FromStr};

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

const NUMBER_ESCAPE_CHAR: &[char] = &['%', ',', ' ', '"', '\n', '\r', '\t', '\u{a0}'];

static PERCENTAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(-?\d+(?:\.\d+)?)\s*%").expect("percentage pattern is valid")
});

/// Parses a decimal value from a given string.
///
/// Thousands separators, percent signs and whitespace are removed before
/// parsing; `escape_chars` adds more characters to strip.
///
/// # Example
///
/// ```ignore
/// let value = parse_decimal("5.25 %", None)?;
/// assert_eq!(value, dec!(5.25));
/// ```
pub fn parse_decimal(s: &str, escape_chars: Option<Vec<char>>) -> Result<Decimal> {
    let cleaned = clean_escape_chars(s, escape_chars);
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|why| anyhow!("Failed to parse '{}' as Decimal because {:?}", cleaned, why))
}

/// 取出字串中第一個百分比數值，例︰"HKD 1,000,000 6.083%" => 6.083
pub fn first_percentage(s: &str) -> Option<Decimal> {
    PERCENTAGE
        .captures(s)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Decimal::from_str(m.as_str()).ok())
}

/// Removes a set of escape characters from a given string.
pub(crate) fn clean_escape_chars(s: &str, escape_chars: Option<Vec<char>>) -> String {
    let mut combined: Vec<char> = NUMBER_ESCAPE_CHAR.to_vec();
    if let Some(ec) = escape_chars {
        combined.extend(ec);
    }

    let filters = combined.iter().collect::<HashSet<_>>();
    s.chars().filter(|c| !filters.contains(c)).collect()
}

/// 將連續空白壓成單一空白，用於比對網頁文字
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Selector};

use crate::util::text;

/// Parses a CSS selector, turning the scraper error into an `anyhow` error.
pub fn selector(css_selector: &str) -> Result<Selector> {
    Selector::parse(css_selector)
        .map_err(|why| anyhow!("Failed to Selector::parse({}) because: {:?}", css_selector, why))
}

/// Extracts the text value of the first element matching `css_selector`.
///
/// Returns `None` when the selector is invalid or nothing matches.
///
/// ```ignore
/// let html = Html::parse_fragment(r#"<td><span class="text-price">6.083%</span></td>"#);
/// let td = html.select(&selector("td")?).next().unwrap();
/// assert_eq!(parse_value(&td, "span.text-price"), Some("6.083%".to_string()));
/// ```
pub fn parse_value(element: &ElementRef, css_selector: &str) -> Option<String> {
    match Selector::parse(css_selector) {
        Ok(s) => element
            .select(&s)
            .next()
            .map(|v| v.text().collect::<String>()),
        Err(_) => None,
    }
}

/// 元素底下所有文字，連續空白會被壓成一個
pub fn text_of(element: &ElementRef) -> String {
    text::squash_whitespace(&element.text().collect::<String>())
}

/// 將表格攤平成每列的儲存格文字 (th 與 td 都算)
pub fn table_rows(table: &ElementRef) -> Vec<Vec<String>> {
    let (Ok(tr), Ok(cell)) = (Selector::parse("tr"), Selector::parse("th, td")) else {
        return Vec::new();
    };

    table
        .select(&tr)
        .map(|row| row.select(&cell).map(|c| text_of(&c)).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect()
}

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use scraper::Html;

use crate::{
    crawler::bank::is_plausible_prime,
    util::{
        self,
        http::element,
        text::{self, first_percentage},
    },
};

const URL: &str = "https://www.hsbc.com.hk/investments/market-information/hk/lending-rate/";

static BEST_LENDING_RATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Hong Kong Dollar\s+)?Best Lending Rate[:\s]*(\d+\.?\d*)\s*%")
        .expect("Failed to compile best lending rate regex")
});

/// 匯豐港元最優惠利率
pub async fn visit() -> Result<Decimal> {
    let mut headers = HeaderMap::new();
    headers.insert("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8".parse()?);
    headers.insert("Accept-Language", "en-US,en;q=0.9".parse()?);

    let text = util::http::get(URL, Some(headers)).await?;
    parse(&text)
}

/// 先以正規表示式比對原始網頁，找不到再逐一檢查標題與段落
pub fn parse(html: &str) -> Result<Decimal> {
    if let Some(rate) = BEST_LENDING_RATE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|m| text::parse_decimal(m.as_str(), None).ok())
        .filter(|rate| is_plausible_prime(*rate))
    {
        return Ok(rate);
    }

    let document = Html::parse_document(html);
    let selector = element::selector("h1, h2, h3, p, span, div")?;

    document
        .select(&selector)
        .map(|el| element::text_of(&el))
        .filter(|t| t.to_lowercase().contains("best lending rate"))
        .filter_map(|t| first_percentage(&t))
        .find(|rate| is_plausible_prime(*rate))
        .ok_or_else(|| anyhow!("Best Lending Rate not found on {}", URL))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_parse_heading() {
        let html = r#"<html><body>
            <h2>Hong Kong Dollar Best Lending Rate: 5.25%</h2>
            <p>Effective from 2 October 2025</p>
        </body></html>"#;
        assert_eq!(parse(html).unwrap(), dec!(5.25));
    }

    #[test]
    fn test_parse_split_markup_falls_back_to_dom() {
        let html = r#"<html><body>
            <div class="rate"><span>Best lending rate</span> <strong>5.000</strong>%</div>
        </body></html>"#;
        assert_eq!(parse(html).unwrap(), dec!(5.000));
    }

    #[test]
    fn test_parse_rejects_implausible_rate() {
        let html = "<p>Best Lending Rate: 0.5%</p>";
        assert!(parse(html).is_err());
        assert!(parse("<p>nothing here</p>").is_err());
    }
}

use anyhow::{anyhow, Result};
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use scraper::Html;

use crate::{
    crawler::bank::is_plausible_prime,
    util::{self, http::element, text},
};

const URL: &str = "https://www.dbs.com.hk/personal/loans/home-loans/home-advice/interestrate.html";

/// 星展港元最優惠利率
pub async fn visit() -> Result<Decimal> {
    let mut headers = HeaderMap::new();
    headers.insert("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8".parse()?);
    headers.insert("Accept-Language", "en-US,en;q=0.9".parse()?);

    let text = util::http::get(URL, Some(headers)).await?;
    parse(&text)
}

/// 表格的第一列是目前的利率，例︰["26-Sep-25", "5.375"]
pub fn parse(html: &str) -> Result<Decimal> {
    let document = Html::parse_document(html);
    let table_selector = element::selector("table")?;

    for table in document.select(&table_selector) {
        let caption = element::text_of(&table).to_lowercase();
        if !caption.contains("prime") && !caption.contains("dbs") {
            continue;
        }

        let rate = element::table_rows(&table)
            .iter()
            .filter(|cells| cells.len() >= 2)
            .filter_map(|cells| text::parse_decimal(&cells[1], None).ok())
            .find(|rate| is_plausible_prime(*rate));

        if let Some(rate) = rate {
            return Ok(rate);
        }
    }

    Err(anyhow!("DBS prime rate table not found on {}", URL))
}

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scraper::{ElementRef, Html};

use crate::{
    crawler::{Batch, DateWindow, Fetcher, Record},
    declare::{Series, Source},
    error::FetchError,
    util::{self, http::element, text::first_percentage},
};

const URL: &str = "https://www.interactivebrokers.com/en/trading/margin-rates.php";

const CURRENCIES: [(&str, Series); 2] = [("USD", Series::IbMarginUsd), ("HKD", Series::IbMarginHkd)];

/// IBKR Pro 融資利率 (最低級距)
pub async fn visit() -> Result<Vec<(Series, Decimal)>> {
    let mut headers = HeaderMap::new();
    headers.insert("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8".parse()?);
    headers.insert("Accept-Language", "en-US,en;q=0.9".parse()?);

    let text = util::http::get(URL, Some(headers)).await?;
    parse(&text)
}

/// 第三欄 (IBKR Pro) 的第一個百分比才是總利率，後面的 BM + x% 是加碼
fn rate_of_cell(cell: &ElementRef) -> Option<Decimal> {
    element::parse_value(cell, "span.text-price")
        .and_then(|price| first_percentage(&price))
        .or_else(|| first_percentage(&element::text_of(cell)))
}

pub fn parse(html: &str) -> Result<Vec<(Series, Decimal)>> {
    let document = Html::parse_document(html);
    let table_selector = element::selector("table")?;
    let th_selector = element::selector("th")?;
    let tr_selector = element::selector("tr")?;
    let td_selector = element::selector("td")?;

    for table in document.select(&table_selector) {
        let headers: Vec<String> = table
            .select(&th_selector)
            .map(|th| element::text_of(&th).to_lowercase())
            .collect();

        if !headers.iter().any(|h| h.contains("currency")) {
            continue;
        }

        if !headers.iter().any(|h| h.contains("rate") || h.contains("pro")) {
            continue;
        }

        let mut rates: Vec<(Series, Decimal)> = Vec::with_capacity(CURRENCIES.len());
        for row in table.select(&tr_selector) {
            let cells: Vec<ElementRef> = row.select(&td_selector).collect();
            if cells.len() < 3 {
                continue;
            }

            let currency = element::text_of(&cells[0]);
            let Some((_, series)) = CURRENCIES.iter().find(|(ccy, _)| *ccy == currency) else {
                continue;
            };

            // 同一幣別只取第一個級距
            if rates.iter().any(|(s, _)| s == series) {
                continue;
            }

            if let Some(rate) = rate_of_cell(&cells[2]).filter(|r| *r > dec!(0.5) && *r < dec!(20)) {
                rates.push((*series, rate));
            }
        }

        if !rates.is_empty() {
            return Ok(rates);
        }
    }

    Err(anyhow!("Margin rate table not found on {}", URL))
}

pub struct InteractiveBrokers;

#[async_trait]
impl Fetcher for InteractiveBrokers {
    fn source(&self) -> Source {
        Source::InteractiveBrokers
    }

    async fn fetch(&self, window: &DateWindow) -> Result<Batch, FetchError> {
        let as_of = window.to.format("%Y-%m-%d").to_string();
        let rates = visit()
            .await
            .map_err(|why| FetchError::from_anyhow(self.source(), why))?;

        Ok(rates
            .into_iter()
            .map(|(series, rate)| Record::percent(series, as_of.as_str(), rate.to_string()))
            .collect::<Vec<_>>()
            .into())
    }
}

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scraper::Html;

use crate::{
    crawler::{Batch, DateWindow, Fetcher, Record},
    declare::{Series, Source, Unit},
    error::FetchError,
    util::{self, http::element, text},
};

const URL: &str = "https://www.cmegroup.com/markets/interest-rates/cme-fedwatch-tool.html";

/// 目標區間，例︰"425-450" (基點) 或 "4.25-4.50" (百分比)
static TARGET_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*-\s*(\d+(?:\.\d+)?)").expect("Failed to compile target range regex")
});

/// 上限超過此值就視為基點
const BASIS_POINTS_THRESHOLD: Decimal = dec!(25);

#[derive(Debug, Clone, Copy, PartialEq)]
struct TargetRange {
    midpoint: Decimal,
    unit: Unit,
}

fn parse_range(header: &str) -> Option<TargetRange> {
    let caps = TARGET_RANGE.captures(header)?;
    let low = text::parse_decimal(caps.get(1)?.as_str(), None).ok()?;
    let high = text::parse_decimal(caps.get(2)?.as_str(), None).ok()?;
    if high < low {
        return None;
    }

    let unit = if high > BASIS_POINTS_THRESHOLD {
        Unit::BasisPoints
    } else {
        Unit::Percent
    };

    Some(TargetRange {
        midpoint: low.checked_add(high)? / dec!(2),
        unit,
    })
}

/// 一次 FOMC 會議的機率加權隱含利率
#[derive(Debug, Clone, PartialEq)]
pub struct Meeting {
    pub name: String,
    pub implied: Decimal,
    pub unit: Unit,
}

/// 表頭為各目標區間，每列一次會議，儲存格為機率
pub fn parse(html: &str) -> Result<Vec<Meeting>> {
    let document = Html::parse_document(html);
    let table_selector = element::selector("table")?;

    for table in document.select(&table_selector) {
        let caption = element::text_of(&table).to_lowercase();
        if !["meeting", "probability", "fomc"]
            .iter()
            .any(|k| caption.contains(k))
        {
            continue;
        }

        let rows = element::table_rows(&table);
        let Some((headers, body)) = rows.split_first() else {
            continue;
        };

        let ranges: Vec<Option<TargetRange>> = headers.iter().map(|h| parse_range(h)).collect();
        let meetings: Vec<Meeting> = body
            .iter()
            .filter_map(|cells| implied_rate(cells, &ranges))
            .collect();

        if !meetings.is_empty() {
            return Ok(meetings);
        }
    }

    Err(anyhow!("FedWatch probability table not found on {}", URL))
}

/// Σ p·midpoint / Σ p
fn implied_rate(cells: &[String], ranges: &[Option<TargetRange>]) -> Option<Meeting> {
    let name = cells.first()?.clone();
    let mut weighted = Decimal::ZERO;
    let mut total = Decimal::ZERO;
    let mut unit = None;

    for (cell, range) in cells.iter().zip(ranges).skip(1) {
        let Some(range) = range else {
            continue;
        };
        let Ok(probability) = text::parse_decimal(cell, None) else {
            continue;
        };

        // 儲存格的數字可能大到溢位，這種儲存格直接略過
        let Some((w, t)) = probability
            .checked_mul(range.midpoint)
            .and_then(|product| Some((weighted.checked_add(product)?, total.checked_add(probability)?)))
        else {
            continue;
        };
        weighted = w;
        total = t;
        unit.get_or_insert(range.unit);
    }

    if total <= Decimal::ZERO {
        return None;
    }

    Some(Meeting {
        name,
        implied: weighted.checked_div(total)?.round_dp(4).normalize(),
        unit: unit?,
    })
}

/// 下一次與最遠一次會議的隱含利率
pub fn to_records(meetings: &[Meeting], as_of: &str) -> Vec<Record> {
    let picks = [
        (Series::FedWatchNext, meetings.first()),
        (Series::FedWatchFar, meetings.last()),
    ];

    picks
        .into_iter()
        .filter_map(|(series, meeting)| {
            meeting.map(|m| Record::new(series, as_of, m.implied.to_string(), m.unit))
        })
        .collect()
}

pub async fn visit() -> Result<Vec<Meeting>> {
    let mut headers = HeaderMap::new();
    headers.insert("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8".parse()?);
    headers.insert("Accept-Language", "en-US,en;q=0.9".parse()?);
    headers.insert("Referer", "https://www.cmegroup.com/".parse()?);

    let text = util::http::get(URL, Some(headers)).await?;
    parse(&text)
}

/// 只有當下的機率，沒有歷史資料
pub struct FedWatch;

#[async_trait]
impl Fetcher for FedWatch {
    fn source(&self) -> Source {
        Source::FedWatch
    }

    async fn fetch(&self, window: &DateWindow) -> Result<Batch, FetchError> {
        let meetings = visit()
            .await
            .map_err(|why| FetchError::from_anyhow(self.source(), why))?;

        Ok(to_records(&meetings, &window.to.format("%Y-%m-%d").to_string()).into())
    }
}

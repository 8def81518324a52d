use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    crawler::{json_number_text, Batch, DateWindow, Fetcher, Record},
    declare::{Series, Source},
    error::FetchError,
    util,
};

const NYFED_BASE: &str = "https://markets.newyorkfed.org/api/rates/secured/sofr";

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RefRate {
    pub effective_date: String,
    #[serde(default)]
    pub percent_rate: Value,
    #[serde(default)]
    pub volume_in_billions: Value,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefRates {
    #[serde(default)]
    pub ref_rates: Vec<RefRate>,
}

impl RefRates {
    pub fn to_records(&self) -> Vec<Record> {
        self.ref_rates
            .iter()
            .filter_map(|r| {
                json_number_text(&r.percent_rate)
                    .map(|rate| Record::percent(Series::Sofr, r.effective_date.as_str(), rate))
            })
            .collect()
    }
}

/// 最新一筆 SOFR
pub async fn visit_latest() -> Result<RefRates> {
    let url = format!("{}/last/1.json", NYFED_BASE);
    util::http::get_json::<RefRates>(&url).await
}

/// 區間內的 SOFR
pub async fn visit_range(window: &DateWindow) -> Result<RefRates> {
    let url = format!("{}/search.json", NYFED_BASE);
    let query = [
        ("startDate", window.from.format("%Y-%m-%d").to_string()),
        ("endDate", window.to.format("%Y-%m-%d").to_string()),
    ];

    util::http::get_json_with_query::<_, RefRates>(&url, &query).await
}

pub struct NyFed;

#[async_trait]
impl Fetcher for NyFed {
    fn source(&self) -> Source {
        Source::NyFed
    }

    fn serves_history(&self) -> bool {
        true
    }

    async fn fetch(&self, window: &DateWindow) -> Result<Batch, FetchError> {
        let result = if window.is_single_day() {
            visit_latest().await.and_then(|rates| {
                let records = rates.to_records();
                if records.is_empty() {
                    Err(anyhow!("No SOFR rate in the latest publication"))
                } else {
                    Ok(records)
                }
            })
        } else {
            visit_range(window).await.map(|rates| rates.to_records())
        };

        result
            .map(Batch::from)
            .map_err(|why| FetchError::from_anyhow(self.source(), why))
    }
}

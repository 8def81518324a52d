use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    crawler::{json_number_text, Batch, DateWindow, Fetcher, Record},
    declare::{Series, Source, Unit},
    error::FetchError,
    logging,
    util::{self, text},
};

const HKMA_FORWARD_URL: &str = "https://api.hkma.gov.hk/public/market-data-and-statistics/monthly-statistical-bulletin/er-ir/hkd-fer-daily";

/// 期別，例︰"1M"、"3 Months"、"1-Year"
static TENOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*-?\s*(m|mo|mth|months?|y|yr|years?)\s*$")
        .expect("Failed to compile tenor regex")
});

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Header {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub err_msg: String,
}

/// 一個期別的報價，日期欄位在不同資料集叫 end_of_day 或 end_of_date
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ForwardQuote {
    #[serde(alias = "end_of_date")]
    pub end_of_day: Option<String>,
    pub tenor: Option<String>,
    pub bid: Option<Value>,
    pub offer: Option<Value>,
}

impl ForwardQuote {
    /// 買賣價的中間值，只有一邊時用那一邊
    fn mid(&self) -> Option<Decimal> {
        let quote = |v: &Option<Value>| {
            v.as_ref()
                .and_then(json_number_text)
                .and_then(|s| text::parse_decimal(&s, None).ok())
        };

        match (quote(&self.bid), quote(&self.offer)) {
            (Some(bid), Some(offer)) => bid.checked_add(offer).map(|sum| sum / dec!(2)),
            (Some(one), None) | (None, Some(one)) => Some(one),
            (None, None) => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ForwardResult {
    #[serde(default)]
    pub datasize: u64,
    #[serde(default)]
    pub records: Vec<ForwardQuote>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ForwardResponse {
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub result: ForwardResult,
}

fn tenor_series(tenor: &str) -> Option<Series> {
    let caps = TENOR.captures(tenor)?;
    let count: u32 = caps.get(1)?.as_str().parse().ok()?;
    let months = if caps.get(2)?.as_str().to_ascii_lowercase().starts_with('y') {
        count.checked_mul(12)?
    } else {
        count
    };

    match months {
        1 => Some(Series::HkdForward1M),
        3 => Some(Series::HkdForward3M),
        6 => Some(Series::HkdForward6M),
        12 => Some(Series::HkdForward12M),
        _ => None,
    }
}

impl ForwardResponse {
    /// 只取最新一天的報價
    pub fn to_records(&self) -> Result<Vec<Record>> {
        if !self.header.success {
            return Err(anyhow!("HKMA responded with error: {}", self.header.err_msg));
        }

        let latest = self
            .result
            .records
            .iter()
            .filter_map(|q| q.end_of_day.as_deref())
            .max()
            .ok_or_else(|| anyhow!("No HKD forward rate in the HKMA response"))?;

        let records: Vec<Record> = self
            .result
            .records
            .iter()
            .filter(|q| q.end_of_day.as_deref() == Some(latest))
            .filter_map(|q| {
                let series = tenor_series(q.tenor.as_deref()?)?;
                let mid = q.mid()?;
                Some(Record::new(series, latest, mid.normalize().to_string(), Unit::Pips))
            })
            .collect();

        if records.is_empty() {
            return Err(anyhow!("No tracked tenor in the HKD forward rates of {}", latest));
        }

        Ok(records)
    }
}

pub async fn visit() -> Result<ForwardResponse> {
    util::http::get_json::<ForwardResponse>(HKMA_FORWARD_URL).await
}

/// 金管局只提供最新報價
pub struct Hkma;

#[async_trait]
impl Fetcher for Hkma {
    fn source(&self) -> Source {
        Source::Hkma
    }

    async fn fetch(&self, _window: &DateWindow) -> Result<Batch, FetchError> {
        let response = visit()
            .await
            .map_err(|why| FetchError::from_anyhow(self.source(), why))?;
        logging::debug_file_async(format!(
            "HKMA returned {} of {} forward quotes",
            response.result.records.len(),
            response.result.datasize
        ));

        response
            .to_records()
            .map(Batch::from)
            .map_err(|why| FetchError::from_anyhow(self.source(), why))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "header": {"success": true, "err_code": "0000", "err_msg": "No error found"},
        "result": {
            "datasize": 6,
            "records": [
                {"end_of_day": "2024-01-08", "tenor": "1M", "bid": -52.5, "offer": -47.5},
                {"end_of_day": "2024-01-08", "tenor": "3M", "bid": "-150", "offer": "-140"},
                {"end_of_day": "2024-01-08", "tenor": "6M", "bid": -260.0, "offer": null},
                {"end_of_day": "2024-01-08", "tenor": "1Y", "bid": -420, "offer": -400},
                {"end_of_day": "2024-01-08", "tenor": "2Y", "bid": -700, "offer": -650},
                {"end_of_day": "2024-01-05", "tenor": "1M", "bid": -60, "offer": -55}
            ]
        }
    }"#;

    #[test]
    fn test_to_records_keeps_latest_day() {
        let response: ForwardResponse = serde_json::from_str(RESPONSE).unwrap();
        let records = response.to_records().unwrap();

        assert_eq!(
            records,
            vec![
                Record::new(Series::HkdForward1M, "2024-01-08", "-50", Unit::Pips),
                Record::new(Series::HkdForward3M, "2024-01-08", "-145", Unit::Pips),
                Record::new(Series::HkdForward6M, "2024-01-08", "-260", Unit::Pips),
                Record::new(Series::HkdForward12M, "2024-01-08", "-410", Unit::Pips),
            ]
        );
    }

    #[test]
    fn test_end_of_date_alias() {
        let json = r#"{
            "header": {"success": true},
            "result": {"records": [{"end_of_date": "2024-01-08", "tenor": "3 Months", "bid": 10, "offer": 12}]}
        }"#;
        let response: ForwardResponse = serde_json::from_str(json).unwrap();
        let records = response.to_records().unwrap();
        assert_eq!(records[0].series, Series::HkdForward3M);
        assert_eq!(records[0].value, "11");
    }

    #[test]
    fn test_tenor_series() {
        assert_eq!(tenor_series("1M"), Some(Series::HkdForward1M));
        assert_eq!(tenor_series("12 months"), Some(Series::HkdForward12M));
        assert_eq!(tenor_series("1-Year"), Some(Series::HkdForward12M));
        assert_eq!(tenor_series("2Y"), None);
        assert_eq!(tenor_series("spot"), None);
    }

    #[test]
    fn test_error_header() {
        let json = r#"{"header": {"success": false, "err_msg": "Invalid parameter"}}"#;
        let response: ForwardResponse = serde_json::from_str(json).unwrap();
        let why = response.to_records().unwrap_err();
        assert!(why.to_string().contains("Invalid parameter"));
    }

    #[test]
    fn test_empty_records() {
        let json = r#"{"header": {"success": true}, "result": {"datasize": 0, "records": []}}"#;
        let response: ForwardResponse = serde_json::from_str(json).unwrap();
        assert!(response.to_records().is_err());
    }

    #[tokio::test]
    #[ignore]
    async fn test_visit() {
        dotenv::dotenv().ok();
        match Hkma.fetch(&DateWindow::today(util::datetime::today())).await {
            Ok(batch) => logging::debug_file_async(format!("batch: {:#?}", batch)),
            Err(why) => logging::debug_file_async(format!("Failed to fetch because {:?}", why)),
        }
        logging::flush();
    }
}

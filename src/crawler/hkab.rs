use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, TimeDelta};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    crawler::{json_number_text, Batch, DateWindow, Fetcher, Record},
    declare::{Series, Source},
    error::FetchError,
    logging, util,
};

const HKAB_HIBOR_URL: &str = "https://www.hkab.org.hk/api/hibor";

/// 遇到假日時往前找的天數
const HOLIDAY_LOOKBACK_DAYS: i64 = 4;

/// HKAB 欄位名稱 => 序列
const TENORS: [(&str, Series); 4] = [
    ("Overnight", Series::HiborOvernight),
    ("1 Month", Series::Hibor1M),
    ("3 Months", Series::Hibor3M),
    ("12 Months", Series::Hibor12M),
];

/// HKAB 單日的 HIBOR 定價
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct HiborFixing {
    #[serde(default)]
    pub is_holiday: bool,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    #[serde(flatten)]
    pub rates: HashMap<String, Value>,
}

impl HiborFixing {
    /// 定價日，回應沒有日期時使用查詢日
    fn date(&self, requested: NaiveDate) -> NaiveDate {
        match (self.year, self.month, self.day) {
            (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y, m, d).unwrap_or(requested),
            _ => requested,
        }
    }

    pub fn to_records(&self, requested: NaiveDate) -> Result<Vec<Record>> {
        if self.is_holiday {
            return Ok(Vec::new());
        }

        let as_of = self.date(requested).format("%Y-%m-%d").to_string();
        let records: Vec<Record> = TENORS
            .iter()
            .filter_map(|(field, series)| {
                self.rates
                    .get(*field)
                    .and_then(json_number_text)
                    .map(|value| Record::percent(*series, as_of.as_str(), value))
            })
            .collect();

        if records.is_empty() {
            return Err(anyhow!("No HIBOR tenor found in the fixing of {}", as_of));
        }

        Ok(records)
    }
}

/// 取得指定日期的 HIBOR
pub async fn visit(date: NaiveDate) -> Result<HiborFixing> {
    let query = [
        ("year", date.year().to_string()),
        ("month", date.month().to_string()),
        ("day", date.day().to_string()),
    ];

    util::http::get_json_with_query::<_, HiborFixing>(HKAB_HIBOR_URL, &query).await
}

/// 最近一個營業日的定價，當天是假日就往前找
async fn latest(today: NaiveDate) -> Result<Vec<Record>> {
    for offset in 0..=HOLIDAY_LOOKBACK_DAYS {
        let date = today - TimeDelta::days(offset);
        let fixing = visit(date).await?;
        if !fixing.is_holiday {
            return fixing.to_records(date);
        }
    }

    logging::warn_file_async(format!(
        "HKAB returned holiday for the {} days before {}",
        HOLIDAY_LOOKBACK_DAYS, today
    ));

    Ok(Vec::new())
}

async fn history(window: &DateWindow) -> Batch {
    let dates: Vec<NaiveDate> = window.weekdays().collect();
    let tasks = dates.iter().map(|date| async move {
        let fixing = visit(*date).await?;
        fixing.to_records(*date)
    });

    collect_days(dates.iter().copied().zip(join_all(tasks).await))
}

/// 失敗的日子逐日回報，其餘照常寫入
fn collect_days(results: impl IntoIterator<Item = (NaiveDate, Result<Vec<Record>>)>) -> Batch {
    let mut batch = Batch::default();

    for (date, result) in results {
        match result {
            Ok(records) => batch.records.extend(records),
            Err(why) => {
                logging::error_file_async(format!(
                    "Failed to get HIBOR of {} because {:?}",
                    date, why
                ));
                batch.push_failure(FetchError::new(
                    Source::Hkab,
                    format!("{}: {:#}", date, why),
                ));
            }
        }
    }

    batch
}

pub struct Hkab;

#[async_trait]
impl Fetcher for Hkab {
    fn source(&self) -> Source {
        Source::Hkab
    }

    fn serves_history(&self) -> bool {
        true
    }

    async fn fetch(&self, window: &DateWindow) -> Result<Batch, FetchError> {
        if !window.is_single_day() {
            return history(window).await.into_result(self.source());
        }

        latest(window.to)
            .await
            .map(Batch::from)
            .map_err(|why| FetchError::from_anyhow(self.source(), why))
    }
}

#[cfg(test)]
mod tests {
    use crate::logging;

    use super::*;

    const FIXING: &str = r#"{
        "isHoliday": false,
        "year": 2024, "month": 1, "day": 2,
        "Overnight": 5.13476,
        "1 Week": 4.87488,
        "1 Month": "4.68810",
        "3 Months": 4.66131,
        "6 Months": 4.62679,
        "12 Months": 4.54595
    }"#;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_to_records() {
        let fixing: HiborFixing = serde_json::from_str(FIXING).unwrap();
        let records = fixing.to_records(ymd(2024, 1, 3)).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(
            records[0],
            Record::percent(Series::HiborOvernight, "2024-01-02", "5.13476")
        );
        assert_eq!(records[1].value, "4.68810");
        assert!(records.iter().all(|r| r.as_of == "2024-01-02"));
    }

    #[test]
    fn test_holiday_has_no_records() {
        let fixing: HiborFixing =
            serde_json::from_str(r#"{"isHoliday": true, "year": 2024, "month": 1, "day": 1}"#)
                .unwrap();
        assert!(fixing.to_records(ymd(2024, 1, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_fixing_without_tenors_is_an_error() {
        let fixing: HiborFixing = serde_json::from_str(r#"{"isHoliday": false}"#).unwrap();
        assert!(fixing.to_records(ymd(2024, 1, 2)).is_err());
    }

    #[test]
    fn test_failed_days_are_reported_with_the_rest_kept() {
        let fixing: HiborFixing = serde_json::from_str(FIXING).unwrap();
        let batch = collect_days(vec![
            (ymd(2024, 1, 2), fixing.to_records(ymd(2024, 1, 2))),
            (ymd(2024, 1, 3), Err(anyhow!("status 502"))),
        ]);

        assert_eq!(batch.records.len(), 4);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].origin, Source::Hkab);
        assert_eq!(batch.failures[0].reason, "2024-01-03: status 502");
    }

    #[tokio::test]
    #[ignore]
    async fn test_visit() {
        dotenv::dotenv().ok();
        logging::debug_file_async("開始 hkab::visit");

        match Hkab.fetch(&DateWindow::today(util::datetime::today())).await {
            Ok(batch) => logging::debug_file_async(format!("batch: {:#?}", batch)),
            Err(why) => logging::debug_file_async(format!("Failed to fetch because {:?}", why)),
        }

        logging::debug_file_async("結束 hkab::visit");
        logging::flush();
    }
}

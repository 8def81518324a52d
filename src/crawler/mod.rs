use std::ops::RangeInclusive;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde_json::Value;

use crate::{
    config,
    declare::{Series, Source, Unit},
    error::{FetchError, RunError},
    util::datetime::Weekend,
};

/// 匯豐、星展最優惠利率
pub mod bank;
/// 星展 e$aver 存款推廣
pub mod esaver;
/// CME FedWatch
pub mod fedwatch;
/// St. Louis Fed FRED
pub mod fred;
/// 香港銀行公會 HIBOR
pub mod hkab;
/// 金管局港元遠期
pub mod hkma;
/// Interactive Brokers 融資利率
pub mod interactive_brokers;
/// New York Fed SOFR
pub mod nyfed;
/// 美國財政部殖利率曲線
pub mod treasury;

/// 抓回來尚未驗證的原始資料，日期與數值都保留網站上的文字
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub series: Series,
    pub as_of: String,
    pub value: String,
    pub unit: Unit,
}

impl Record {
    pub fn new(
        series: Series,
        as_of: impl Into<String>,
        value: impl Into<String>,
        unit: Unit,
    ) -> Self {
        Record {
            series,
            as_of: as_of.into(),
            value: value.into(),
            unit,
        }
    }

    pub fn percent(series: Series, as_of: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(series, as_of, value, Unit::Percent)
    }
}

/// 一個來源的抓取結果
///
/// 多個請求組成的來源 (兩家銀行、三個 FRED 序列、回補的每一天) 部分失敗時，
/// 成功的部分放在 `records`，失敗的部分放在 `failures`。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub records: Vec<Record>,
    pub failures: Vec<FetchError>,
}

impl Batch {
    pub fn push_failure(&mut self, failure: FetchError) {
        self.failures.push(failure);
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// 全部失敗時轉成單一錯誤，否則保留部分結果
    pub fn into_result(self, source: Source) -> Result<Batch, FetchError> {
        if self.records.is_empty() && !self.failures.is_empty() {
            let reasons: Vec<&str> = self.failures.iter().map(|f| f.reason.as_str()).collect();
            return Err(FetchError::new(source, reasons.join("; ")));
        }

        Ok(self)
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        Batch {
            records,
            failures: Vec::new(),
        }
    }
}

/// 抓取的日期區間 (含頭尾)，每日執行時 from == to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn today(today: NaiveDate) -> Self {
        DateWindow {
            from: today,
            to: today,
        }
    }

    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, RunError> {
        if from > to {
            return Err(RunError::Arguments(format!(
                "--from {} is after --to {}",
                from, to
            )));
        }

        Ok(DateWindow { from, to })
    }

    pub fn is_single_day(&self) -> bool {
        self.from == self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.from.iter_days().take_while(move |d| *d <= self.to)
    }

    pub fn weekdays(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days().filter(|d| !d.is_weekend())
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.from.year()..=self.to.year()
    }
}

/// 一個上游資料來源
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn source(&self) -> Source;

    /// 是否能提供歷史資料，不能的來源在回補時會被略過
    fn serves_history(&self) -> bool {
        false
    }

    /// Err 表示整個來源失敗；部分失敗放在 `Batch::failures`
    async fn fetch(&self, window: &DateWindow) -> Result<Batch, FetchError>;
}

/// 所有資料來源，依報表區塊排序
pub fn registry(config: &config::App) -> Vec<Box<dyn Fetcher>> {
    vec![
        Box::new(hkab::Hkab),
        Box::new(bank::BankPrime),
        Box::new(interactive_brokers::InteractiveBrokers),
        Box::new(fred::Fred::new(config.fred.api_key.clone())),
        Box::new(nyfed::NyFed),
        Box::new(treasury::Treasury),
        Box::new(fedwatch::FedWatch),
        Box::new(hkma::Hkma),
        Box::new(esaver::DbsEsaver),
    ]
}

/// JSON 中的數值可能是 number 也可能是字串，統一轉為文字
pub(crate) fn json_number_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_window() {
        let window = DateWindow::new(ymd(2023, 12, 29), ymd(2024, 1, 2)).unwrap();
        assert_eq!(window.days().count(), 5);
        assert_eq!(
            window.weekdays().collect::<Vec<_>>(),
            vec![ymd(2023, 12, 29), ymd(2024, 1, 1), ymd(2024, 1, 2)]
        );
        assert_eq!(window.years(), 2023..=2024);
        assert!(window.contains(ymd(2023, 12, 31)));
        assert!(!window.contains(ymd(2024, 1, 3)));
        assert!(!window.is_single_day());
        assert!(DateWindow::today(ymd(2024, 1, 2)).is_single_day());
    }

    #[test]
    fn test_date_window_rejects_reversed_range() {
        let err = DateWindow::new(ymd(2024, 2, 1), ymd(2024, 1, 1)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_registry_covers_every_source() {
        let fetchers = registry(&config::App::default());
        let sources: Vec<Source> = fetchers.iter().map(|f| f.source()).collect();
        assert_eq!(sources, Source::iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_batch_into_result() {
        let partial = Batch {
            records: vec![Record::percent(Series::PrimeDbs, "2024-01-09", "5.875")],
            failures: vec![FetchError::for_series(Series::PrimeHsbc, "status 503")],
        };
        let kept = partial.clone().into_result(Source::BankPrime).unwrap();
        assert_eq!(kept, partial);
        assert!(!kept.is_complete());

        let mut nothing = Batch::default();
        nothing.push_failure(FetchError::for_series(Series::PrimeHsbc, "status 503"));
        nothing.push_failure(FetchError::for_series(Series::PrimeDbs, "timeout"));
        let err = nothing.into_result(Source::BankPrime).unwrap_err();
        assert_eq!(err.series, None);
        assert_eq!(err.reason, "PRIME_HSBC: status 503; PRIME_DBS: timeout");

        assert!(Batch::default().into_result(Source::Hkab).unwrap().is_complete());
    }

    #[test]
    fn test_json_number_text() {
        assert_eq!(json_number_text(&json!(4.33)), Some("4.33".to_string()));
        assert_eq!(json_number_text(&json!(" 4.5 ")), Some("4.5".to_string()));
        assert_eq!(json_number_text(&json!("")), None);
        assert_eq!(json_number_text(&Value::Null), None);
    }
}

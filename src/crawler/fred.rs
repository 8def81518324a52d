use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use crate::{
    crawler::{Batch, DateWindow, Fetcher, Record},
    declare::{Series, Source},
    error::FetchError,
    logging, util,
};

const FRED_BASE: &str = "https://api.stlouisfed.org/fred/series/observations";

/// FRED 序列代號 => 序列
const FRED_SERIES: [(&str, Series); 3] = [
    ("DFF", Series::FedFundsEffective),
    ("DFEDTARU", Series::FedFundsTargetUpper),
    ("DFEDTARL", Series::FedFundsTargetLower),
];

/// FRED 以 "." 表示當天沒有資料
const MISSING_VALUE: &str = ".";

/// 每日模式往前看幾筆，跳過尚未公布的日期
const LATEST_LIMIT: &str = "10";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: String,
    pub value: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Observations {
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl Observations {
    /// 轉為 Record，`latest_only` 時只保留最新一筆
    pub fn to_records(&self, series: Series, latest_only: bool) -> Vec<Record> {
        let mut available = self
            .observations
            .iter()
            .filter(|o| o.value.trim() != MISSING_VALUE && !o.value.trim().is_empty());

        if latest_only {
            // sort_order=desc，第一筆就是最新
            return available
                .next()
                .map(|o| vec![Record::percent(series, o.date.as_str(), o.value.trim())])
                .unwrap_or_default();
        }

        available
            .map(|o| Record::percent(series, o.date.as_str(), o.value.trim()))
            .collect()
    }
}

pub struct Fred {
    api_key: String,
}

impl Fred {
    pub fn new(api_key: String) -> Self {
        Fred { api_key }
    }

    pub async fn visit(&self, series_id: &str, window: &DateWindow) -> Result<Observations> {
        let to = window.to.format("%Y-%m-%d").to_string();
        let mut query = vec![
            ("series_id", series_id.to_string()),
            ("api_key", self.api_key.clone()),
            ("file_type", "json".to_string()),
            ("sort_order", "desc".to_string()),
            ("observation_end", to),
        ];

        if window.is_single_day() {
            query.push(("limit", LATEST_LIMIT.to_string()));
        } else {
            query.push(("observation_start", window.from.format("%Y-%m-%d").to_string()));
        }

        util::http::get_json_with_query::<_, Observations>(FRED_BASE, &query)
            .await
            .map_err(|why| anyhow!("Failed to get FRED {} because {:#}", series_id, why))
    }
}

#[async_trait]
impl Fetcher for Fred {
    fn source(&self) -> Source {
        Source::Fred
    }

    fn serves_history(&self) -> bool {
        true
    }

    async fn fetch(&self, window: &DateWindow) -> Result<Batch, FetchError> {
        if self.api_key.trim().is_empty() {
            return Err(FetchError::new(self.source(), "FRED_API_KEY is not set"));
        }

        let tasks = FRED_SERIES
            .iter()
            .map(|(series_id, _)| self.visit(series_id, window));
        let results = FRED_SERIES
            .iter()
            .map(|(_, series)| *series)
            .zip(join_all(tasks).await);

        collect(results, window.is_single_day()).into_result(self.source())
    }
}

/// 每個 FRED 序列各自成功或失敗
fn collect(
    results: impl IntoIterator<Item = (Series, Result<Observations>)>,
    latest_only: bool,
) -> Batch {
    let mut batch = Batch::default();

    for (series, result) in results {
        match result {
            Ok(observations) => batch
                .records
                .extend(observations.to_records(series, latest_only)),
            Err(why) => {
                logging::error_file_async(format!("{:?}", why));
                batch.push_failure(FetchError::for_series(series, format!("{:#}", why)));
            }
        }
    }

    batch
}

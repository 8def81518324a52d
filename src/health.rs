use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    declare::{Series, Source},
    error::StorageError,
    history::HistoricalTable,
    logging, storage,
};

const HEALTH_FILE: &str = "fetch_health.json";

/// 單一來源的抓取狀態
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SourceHealth {
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub last_success: Option<DateTime<Local>>,
    #[serde(default)]
    pub last_failure: Option<DateTime<Local>>,
}

/// 各來源的抓取狀態，存成 `<data_dir>/fetch_health.json`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct HealthBook {
    sources: BTreeMap<String, SourceHealth>,
}

impl HealthBook {
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(HEALTH_FILE)
    }

    /// 檔案不存在或無法解析時從空白開始
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return HealthBook::default(),
        };

        match serde_json::from_str::<HealthBook>(&text) {
            Ok(book) => book,
            Err(why) => {
                logging::error_file_async(format!(
                    "Failed to parse {} because {:?}, start over",
                    path.display(),
                    why
                ));
                HealthBook::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|why| StorageError::Encode {
            path: path.to_path_buf(),
            reason: why.to_string(),
        })?;

        storage::write_atomic(path, &bytes)
    }

    /// 記錄一次抓取結果，回傳目前的連續失敗次數
    pub fn record(&mut self, source: Source, success: bool, at: DateTime<Local>) -> u32 {
        let health = self.sources.entry(source.to_string()).or_default();

        if success {
            health.consecutive_failures = 0;
            health.last_success = Some(at);
        } else {
            health.consecutive_failures += 1;
            health.last_failure = Some(at);
        }

        health.consecutive_failures
    }

    pub fn get(&self, source: Source) -> Option<&SourceHealth> {
        self.sources.get(source.as_ref())
    }

    /// 連續失敗次數達到門檻的來源
    pub fn alerts(&self, threshold: u32) -> Vec<(String, u32)> {
        self.sources
            .iter()
            .filter(|(_, h)| h.consecutive_failures >= threshold.max(1))
            .map(|(name, h)| (name.clone(), h.consecutive_failures))
            .collect()
    }
}

/// 太久沒有新資料的序列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staleness {
    pub series: Series,
    /// 沒有任何資料時為 None
    pub last_date: Option<NaiveDate>,
    pub days: Option<i64>,
}

impl Staleness {
    pub fn describe(&self) -> String {
        match (self.last_date, self.days) {
            (Some(date), Some(days)) => format!("{}: last {} ({} days ago)", self.series, date, days),
            _ => format!("{}: no data", self.series),
        }
    }
}

/// 最新日期距今超過 `threshold_days` 天 (月資料另有門檻)，或完全沒有資料的序列
pub fn stale_series(
    tables: &[HistoricalTable],
    today: NaiveDate,
    threshold_days: i64,
) -> Vec<Staleness> {
    tables
        .iter()
        .filter_map(|table| match table.latest() {
            None => Some(Staleness {
                series: table.series(),
                last_date: None,
                days: None,
            }),
            Some(latest) => {
                let gap = (today - latest.date).num_days();
                (gap > table.series().stale_after(threshold_days)).then_some(Staleness {
                    series: table.series(),
                    last_date: Some(latest.date),
                    days: Some(gap),
                })
            }
        })
        .collect()
}

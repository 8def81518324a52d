use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write,
};

use chrono::NaiveDate;
use futures::future::join_all;

use crate::{
    crawler::{DateWindow, Fetcher, Record},
    declare::{Series, Source},
    error::{FetchError, StorageError, ValidationError},
    history::{
        merge::merge,
        normalize::normalize,
        Observation,
    },
    logging,
    storage::CsvStore,
};

/// 所有來源的抓取結果
#[derive(Debug, Default)]
pub struct Fetched {
    pub records: Vec<Record>,
    /// 有回應的來源，其中可能有部分失敗
    pub responded: Vec<Source>,
    /// 整個來源失敗與部分失敗都在這裡
    pub failed: Vec<FetchError>,
}

impl Fetched {
    /// 沒有任何失敗的來源
    pub fn succeeded(&self) -> Vec<Source> {
        self.responded
            .iter()
            .copied()
            .filter(|source| !self.failed.iter().any(|f| f.origin == *source))
            .collect()
    }

    /// 有回應的來源中，這次一筆資料都沒有拿到的序列也算失敗
    ///
    /// 只用於每日模式；回補的區間內本來就可能沒有資料。
    pub fn expect_every_series(&mut self) {
        let received: BTreeSet<Series> = self.records.iter().map(|r| r.series).collect();
        let mut missing = Vec::new();

        for source in &self.responded {
            for series in source.series() {
                if received.contains(&series) || self.failed.iter().any(|f| f.covers(series)) {
                    continue;
                }

                logging::warn_file_async(format!("{} returned no data for {}", source, series));
                missing.push(FetchError::for_series(series, "no data returned"));
            }
        }

        self.failed.extend(missing);
    }
}

/// 同時執行所有 fetcher，單一來源失敗不影響其他來源
pub async fn fetch_all(fetchers: &[&dyn Fetcher], window: &DateWindow) -> Fetched {
    let tasks = fetchers.iter().map(|fetcher| async move {
        (fetcher.source(), fetcher.fetch(window).await)
    });

    let mut fetched = Fetched::default();
    for (source, result) in join_all(tasks).await {
        match result {
            Ok(batch) => {
                logging::info_file_async(format!(
                    "{} returned {} records and {} failures for {} ~ {}",
                    source,
                    batch.records.len(),
                    batch.failures.len(),
                    window.from,
                    window.to
                ));
                for failure in &batch.failures {
                    logging::error_file_async(format!("Failed to fetch part of {}", failure));
                }
                fetched.responded.push(source);
                fetched.records.extend(batch.records);
                fetched.failed.extend(batch.failures);
            }
            Err(why) => {
                logging::error_file_async(format!("Failed to fetch because {}", why));
                fetched.failed.push(why);
            }
        }
    }

    fetched
}

/// 單一序列寫入後的統計
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChange {
    pub series: Series,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rows: usize,
}

#[derive(Debug, Default)]
pub struct Stored {
    pub changes: Vec<TableChange>,
    pub rejected: Vec<ValidationError>,
}

/// 驗證、合併並寫回每個有新資料的序列，有變動才寫檔
///
/// 每日與回補共用這段流程。寫檔失敗會直接中止。
pub fn store(store: &CsvStore, records: &[Record], today: NaiveDate) -> Result<Stored, StorageError> {
    let normalized = normalize(records, today);
    let mut stored = Stored {
        changes: Vec::new(),
        rejected: normalized.rejected,
    };

    let mut by_series: BTreeMap<Series, Vec<Observation>> = BTreeMap::new();
    for observation in normalized.observations {
        by_series
            .entry(observation.series)
            .or_default()
            .push(observation);
    }

    for (series, observations) in by_series {
        let existing = store.load(series)?;
        let outcome = merge(existing, &observations);

        if outcome.is_modified() {
            store.save(&outcome.table)?;
        }

        stored.changes.push(TableChange {
            series,
            inserted: outcome.inserted,
            updated: outcome.updated,
            unchanged: outcome.unchanged,
            rows: outcome.table.len(),
        });
        stored.rejected.extend(outcome.rejected);
    }

    for rejected in &stored.rejected {
        logging::warn_file_async(format!("Rejected observation {}", rejected));
    }

    Ok(stored)
}

/// 一次執行的結果，決定 exit code
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: Vec<Source>,
    pub failed: Vec<FetchError>,
    pub skipped: Vec<Source>,
    pub rejected: Vec<ValidationError>,
    pub changes: Vec<TableChange>,
}

impl RunSummary {
    pub fn new(fetched: &Fetched, stored: Stored) -> Self {
        RunSummary {
            succeeded: fetched.succeeded(),
            failed: fetched.failed.clone(),
            skipped: Vec::new(),
            rejected: stored.rejected,
            changes: stored.changes,
        }
    }

    /// 有失敗的來源，部分失敗也算
    pub fn failed_sources(&self) -> BTreeSet<Source> {
        self.failed.iter().map(|f| f.origin).collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty()
    }

    /// 0 全部成功，1 有來源失敗或資料被拒絕
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn describe(&self) -> String {
        let mut text = String::with_capacity(1024);

        for change in &self.changes {
            let _ = writeln!(
                text,
                "{:<24} +{} ~{} ={} rows:{}",
                change.series.id(),
                change.inserted,
                change.updated,
                change.unchanged,
                change.rows
            );
        }

        if !self.succeeded.is_empty() {
            let names: Vec<&str> = self.succeeded.iter().map(|s| s.as_ref()).collect();
            let _ = writeln!(text, "fetched: {}", names.join(", "));
        }

        if !self.skipped.is_empty() {
            let names: Vec<&str> = self.skipped.iter().map(|s| s.as_ref()).collect();
            let _ = writeln!(text, "skipped (no history): {}", names.join(", "));
        }

        for failed in &self.failed {
            let _ = writeln!(text, "FAILED {}", failed);
        }

        for rejected in &self.rejected {
            let _ = writeln!(text, "REJECTED {}", rejected);
        }

        text
    }
}

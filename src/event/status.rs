use std::fmt::Write;

use chrono::NaiveDate;

use crate::{config, error::RunError, health, storage::CsvStore};

/// 每個序列的筆數與日期範圍，以及過期的序列。只讀不寫。
pub fn execute(app: &config::App, today: NaiveDate) -> Result<String, RunError> {
    let store = CsvStore::open(&app.storage.data_dir)?;
    let tables = store.load_all()?;
    let mut text = String::with_capacity(2048);

    let _ = writeln!(text, "data dir: {}", store.dir().display());
    for table in &tables {
        match (table.first(), table.latest()) {
            (Some(first), Some(latest)) => {
                let _ = writeln!(
                    text,
                    "{:<24} {:>6} rows  {} ~ {}  latest {}",
                    table.series().id(),
                    table.len(),
                    first.date,
                    latest.date,
                    latest.value
                );
            }
            _ => {
                let _ = writeln!(text, "{:<24} {:>6} rows", table.series().id(), 0);
            }
        }
    }

    let stale = health::stale_series(&tables, today, app.health.stale_days);
    if !stale.is_empty() {
        let _ = writeln!(text, "stale:");
        for s in &stale {
            let _ = writeln!(text, "  {}", s.describe());
        }
    }

    Ok(text)
}

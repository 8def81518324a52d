use scopeguard::defer;

use crate::{
    config,
    crawler::{DateWindow, Fetcher},
    declare::Source,
    error::RunError,
    ingest::{self, RunSummary},
    logging,
    storage::CsvStore,
    util,
};

/// 回補指定區間的歷史資料，`sources` 為空時回補所有來源
///
/// 不提供歷史資料的來源會列為 skipped，不算失敗。
pub async fn execute(
    app: &config::App,
    fetchers: &[&dyn Fetcher],
    window: DateWindow,
    sources: &[Source],
) -> Result<RunSummary, RunError> {
    logging::info_file_async(format!("回補 {} ~ {} 開始", window.from, window.to));
    defer! {
        logging::info_file_async("回補結束");
    }

    let store = CsvStore::open(&app.storage.data_dir)?;
    let selected: Vec<&dyn Fetcher> = fetchers
        .iter()
        .copied()
        .filter(|f| sources.is_empty() || sources.contains(&f.source()))
        .collect();
    let (capable, skipped): (Vec<&dyn Fetcher>, Vec<&dyn Fetcher>) =
        selected.into_iter().partition(|f| f.serves_history());

    for fetcher in &skipped {
        logging::warn_file_async(format!(
            "{} does not serve history, skipped",
            fetcher.source()
        ));
    }

    let fetched = ingest::fetch_all(&capable, &window).await;
    let stored = ingest::store(&store, &fetched.records, util::datetime::today())?;
    let mut summary = RunSummary::new(&fetched, stored);
    summary.skipped = skipped.iter().map(|f| f.source()).collect();

    for change in &summary.changes {
        logging::info_file_async(format!(
            "{} inserted:{} updated:{} unchanged:{} rows:{}",
            change.series, change.inserted, change.updated, change.unchanged, change.rows
        ));
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::{
        crawler::Record, declare::Series, error::FetchError, ingest::tests::StubFetcher,
    };

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_backfill_skips_sources_without_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = config::App::default();
        app.storage.data_dir = dir.path().to_path_buf();

        let sofr = StubFetcher::ok(
            Source::NyFed,
            vec![
                Record::percent(Series::Sofr, "2024-01-02", "5.31"),
                Record::percent(Series::Sofr, "2024-01-03", "5.32"),
            ],
        );
        let mut prime = StubFetcher::ok(Source::BankPrime, Vec::new());
        prime.history = false;
        let fetchers: Vec<&dyn Fetcher> = vec![&sofr, &prime];
        let window = DateWindow::new(ymd(2024, 1, 1), ymd(2024, 1, 5)).unwrap();

        let summary = execute(&app, &fetchers, window, &[]).await.unwrap();
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.skipped, vec![Source::BankPrime]);
        assert_eq!(summary.changes[0].inserted, 2);

        let store = CsvStore::open(dir.path()).unwrap();
        assert_eq!(store.load(Series::Sofr).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_backfill_selected_sources_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = config::App::default();
        app.storage.data_dir = dir.path().to_path_buf();

        let sofr = StubFetcher::ok(
            Source::NyFed,
            vec![Record::percent(Series::Sofr, "2024-01-02", "5.31")],
        );
        let fred = StubFetcher::failing(Source::Fred);
        let fetchers: Vec<&dyn Fetcher> = vec![&sofr, &fred];
        let window = DateWindow::new(ymd(2024, 1, 1), ymd(2024, 1, 5)).unwrap();

        let summary = execute(&app, &fetchers, window, &[Source::NyFed])
            .await
            .unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.succeeded, vec![Source::NyFed]);

        let summary = execute(&app, &fetchers, window, &[]).await.unwrap();
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_backfill_failed_days_keep_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = config::App::default();
        app.storage.data_dir = dir.path().to_path_buf();

        let hibor = StubFetcher::partial(
            Source::Hkab,
            vec![
                Record::percent(Series::Hibor1M, "2024-01-02", "4.68810"),
                Record::percent(Series::Hibor1M, "2024-01-04", "4.65"),
            ],
            vec![FetchError::new(Source::Hkab, "2024-01-03: status 502")],
        );
        let fetchers: Vec<&dyn Fetcher> = vec![&hibor];
        let window = DateWindow::new(ymd(2024, 1, 2), ymd(2024, 1, 4)).unwrap();

        let summary = execute(&app, &fetchers, window, &[]).await.unwrap();
        assert_eq!(summary.exit_code(), 1);
        assert!(summary.describe().contains("FAILED hkab: 2024-01-03: status 502"));

        let store = CsvStore::open(dir.path()).unwrap();
        assert_eq!(store.load(Series::Hibor1M).unwrap().len(), 2);
    }
}

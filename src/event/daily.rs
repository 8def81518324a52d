use std::{fmt::Write, fs};

use chrono::{Local, NaiveDate};
use concat_string::concat_string;
use scopeguard::defer;

use crate::{
    bot::Notifier,
    config,
    crawler::{DateWindow, Fetcher},
    error::{RunError, StorageError},
    health::{self, HealthBook, Staleness},
    ingest::{self, RunSummary},
    logging,
    report::Report,
    storage::{self, CsvStore},
};

/// 抓取今天的資料 → 寫入歷史 → 更新健康狀態 → 產生報表 → 通知
///
/// `notifier` 為 None 時只產生報表檔。
pub async fn execute(
    app: &config::App,
    fetchers: &[&dyn Fetcher],
    notifier: Option<&dyn Notifier>,
    today: NaiveDate,
) -> Result<RunSummary, RunError> {
    logging::info_file_async("每日利率更新開始");
    defer! {
        logging::info_file_async("每日利率更新結束");
    }

    let store = CsvStore::open(&app.storage.data_dir)?;
    let window = DateWindow::today(today);

    let mut fetched = ingest::fetch_all(fetchers, &window).await;
    fetched.expect_every_series();
    let stored = ingest::store(&store, &fetched.records, today)?;
    let summary = RunSummary::new(&fetched, stored);

    let health_path = HealthBook::path(&app.storage.data_dir);
    let mut book = HealthBook::load(&health_path);
    let now = Local::now();
    for source in &summary.succeeded {
        book.record(*source, true, now);
    }
    for source in summary.failed_sources() {
        book.record(source, false, now);
    }
    book.save(&health_path)?;

    let tables = store.load_all()?;
    let stale = health::stale_series(&tables, today, app.health.stale_days);
    let alerts = book.alerts(app.health.alert_threshold);

    let report = Report::build(today, &tables, &summary.failed, stale.clone());
    let document = report.render();

    fs::create_dir_all(&app.storage.reports_dir).map_err(|source| StorageError::Write {
        path: app.storage.reports_dir.clone(),
        source,
    })?;
    let report_path = app.storage.reports_dir.join(&document.file_name);
    storage::write_atomic(&report_path, document.html.as_bytes())?;
    logging::info_file_async(concat_string!(
        "Report written to ",
        report_path.display().to_string()
    ));

    match notifier {
        None => logging::info_file_async("Notification is disabled"),
        Some(notifier) => {
            if let Some(text) = warning_text(&alerts, &stale, app.health.alert_threshold) {
                if let Err(why) = notifier.alert(&text).await {
                    logging::error_file_async(format!("Failed to send the alert because {}", why));
                }
            }

            if let Err(why) = notifier.send(&document).await {
                logging::error_file_async(format!("Failed to send the report because {}", why));
            }
        }
    }

    Ok(summary)
}

/// 連續失敗與過期序列的警告訊息，都沒有時回傳 None
fn warning_text(alerts: &[(String, u32)], stale: &[Staleness], threshold: u32) -> Option<String> {
    if alerts.is_empty() && stale.is_empty() {
        return None;
    }

    let mut msg = String::with_capacity(512);

    if !alerts.is_empty() {
        let _ = writeln!(
            msg,
            "⚠️ <b>Sources failing {} or more runs in a row</b>",
            threshold
        );
        for (source, failures) in alerts {
            let _ = writeln!(msg, "• {}: {} consecutive failures", source, failures);
        }
    }

    if !stale.is_empty() {
        if !msg.is_empty() {
            msg.push('\n');
        }
        let _ = writeln!(msg, "⏳ <b>Stale series</b>");
        for s in stale {
            let _ = writeln!(msg, "• {}", s.describe());
        }
    }

    Some(msg)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Datelike;

    use crate::{
        crawler::Record,
        declare::{Series, Source},
        error::{DeliveryError, FetchError},
        ingest::tests::StubFetcher,
        report::Document,
    };

    use super::*;

    #[derive(Default)]
    struct StubNotifier {
        alerts: Mutex<Vec<String>>,
        documents: Mutex<Vec<Document>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for StubNotifier {
        async fn alert(&self, text: &str) -> Result<(), DeliveryError> {
            self.alerts.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send(&self, document: &Document) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Failed {
                    target: "stub".to_string(),
                    reason: "offline".to_string(),
                });
            }
            self.documents.lock().unwrap().push(document.clone());
            Ok(())
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn app(dir: &std::path::Path) -> config::App {
        let mut app = config::App::default();
        app.storage.data_dir = dir.join("data");
        app.storage.reports_dir = dir.join("reports");
        app
    }

    fn healthy_sources(today: NaiveDate) -> Vec<StubFetcher> {
        let date = today.format("%Y-%m-%d").to_string();
        let curve_date = today.format("%m/%d/%Y").to_string();
        vec![
            StubFetcher::ok(
                Source::BankPrime,
                vec![
                    Record::percent(Series::PrimeHsbc, date.as_str(), "5.875"),
                    Record::percent(Series::PrimeDbs, date.as_str(), "5.875"),
                ],
            ),
            StubFetcher::ok(
                Source::Fred,
                vec![
                    Record::percent(Series::FedFundsEffective, date.as_str(), "5.33"),
                    Record::percent(Series::FedFundsTargetUpper, date.as_str(), "5.50"),
                    Record::percent(Series::FedFundsTargetLower, date.as_str(), "5.25"),
                ],
            ),
            StubFetcher::ok(
                Source::NyFed,
                vec![Record::percent(Series::Sofr, date.as_str(), "5.31")],
            ),
            StubFetcher::ok(
                Source::Treasury,
                Series::treasury_curve()
                    .into_iter()
                    .map(|s| Record::percent(s, curve_date.as_str(), "4.05"))
                    .collect(),
            ),
        ]
    }

    fn prime(date: &str, hsbc: Option<&str>, dbs: &str) -> Vec<Record> {
        let mut records = vec![Record::percent(Series::PrimeDbs, date, dbs)];
        if let Some(hsbc) = hsbc {
            records.insert(0, Record::percent(Series::PrimeHsbc, date, hsbc));
        }
        records
    }

    #[tokio::test]
    async fn test_one_source_fails_others_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let today = ymd(2024, 1, 9);

        let hkab = StubFetcher::failing(Source::Hkab);
        let healthy = healthy_sources(today);
        let mut fetchers: Vec<&dyn Fetcher> = vec![&hkab];
        fetchers.extend(healthy.iter().map(|f| f as &dyn Fetcher));
        let notifier = StubNotifier::default();

        let summary = execute(&app, &fetchers, Some(&notifier), today)
            .await
            .unwrap();

        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.succeeded.len(), 4);

        let html = fs::read_to_string(app.storage.reports_dir.join("2024-01-09.html")).unwrap();
        assert!(html.contains(r#"<td class="unavailable">Unavailable</td>"#));
        assert!(html.contains("HKAB: connection refused"));
        assert!(html.contains("5.3100%"));
        assert!(html.contains("5.875%"));
        assert!(html.contains("4.05%"));

        let documents = notifier.documents.lock().unwrap();
        assert_eq!(documents.len(), 1);
        assert!(documents[0].summary.contains("Unavailable: HKAB"));
        assert!(documents[0].summary.contains("SOFR: <b>5.3100%</b>"));

        // HIBOR 沒有任何資料，列為過期
        let alerts = notifier.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("HIBOR_1M: no data"));

        let book = HealthBook::load(&HealthBook::path(&app.storage.data_dir));
        assert_eq!(book.get(Source::Hkab).unwrap().consecutive_failures, 1);
        assert_eq!(book.get(Source::NyFed).unwrap().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_bank_page_missing_from_result_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let both = StubFetcher::ok(Source::BankPrime, prime("2024-01-08", Some("5.875"), "6.000"));
        let fetchers: Vec<&dyn Fetcher> = vec![&both];
        let summary = execute(&app, &fetchers, None, ymd(2024, 1, 8)).await.unwrap();
        assert_eq!(summary.exit_code(), 0);

        // 第二天匯豐頁面沒有資料，只拿到星展
        let dbs_only = StubFetcher::ok(Source::BankPrime, prime("2024-01-09", None, "6.000"));
        let fetchers: Vec<&dyn Fetcher> = vec![&dbs_only];
        let summary = execute(&app, &fetchers, None, ymd(2024, 1, 9)).await.unwrap();

        assert_eq!(summary.exit_code(), 1);
        assert!(summary.succeeded.is_empty());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].series, Some(Series::PrimeHsbc));

        let html = fs::read_to_string(app.storage.reports_dir.join("2024-01-09.html")).unwrap();
        assert!(html.contains("Unavailable (last 5.875% on 2024-01-08)"));
        assert!(html.contains(r#"<td class="rate-value" title="2024-01-09">6.000%</td>"#));
        assert!(!html.contains(r#"title="2024-01-08">5.875%"#));
        assert!(html.contains("HSBC / DBS: PRIME_HSBC: no data returned"));

        let book = HealthBook::load(&HealthBook::path(&app.storage.data_dir));
        assert_eq!(book.get(Source::BankPrime).unwrap().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_reported_partial_failure_counts_once() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let today = ymd(2024, 1, 9);

        let partial = StubFetcher::partial(
            Source::BankPrime,
            prime("2024-01-09", None, "6.000"),
            vec![FetchError::for_series(Series::PrimeHsbc, "status 503")],
        );
        let fetchers: Vec<&dyn Fetcher> = vec![&partial];
        let notifier = StubNotifier::default();
        let summary = execute(&app, &fetchers, Some(&notifier), today)
            .await
            .unwrap();

        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].reason.contains("status 503"));

        let documents = notifier.documents.lock().unwrap();
        assert!(documents[0].summary.contains("Unavailable: Prime Rate (HSBC)"));
        assert!(documents[0].summary.contains("DBS Prime: <b>6.000%</b>"));
        assert!(documents[0].html.contains(r#"<td class="unavailable">Unavailable</td>"#));

        let book = HealthBook::load(&HealthBook::path(&app.storage.data_dir));
        assert_eq!(book.get(Source::BankPrime).unwrap().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_consecutive_failures_raise_alert() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let failing = StubFetcher::failing(Source::Fred);
        let fetchers: Vec<&dyn Fetcher> = vec![&failing];

        for day in 8..=10 {
            let notifier = StubNotifier::default();
            let today = ymd(2024, 1, day);
            execute(&app, &fetchers, Some(&notifier), today).await.unwrap();

            let alerts = notifier.alerts.lock().unwrap();
            let raised = alerts.iter().any(|a| a.contains("fred: 3 consecutive failures"));
            assert_eq!(raised, today.day() == 10);
        }
    }

    #[tokio::test]
    async fn test_without_notifier_still_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let today = ymd(2024, 1, 9);
        let healthy = healthy_sources(today);
        let fetchers: Vec<&dyn Fetcher> = healthy.iter().map(|f| f as &dyn Fetcher).collect();

        let summary = execute(&app, &fetchers, None, today).await.unwrap();
        assert_eq!(summary.exit_code(), 0);
        assert!(app.storage.reports_dir.join("2024-01-09.html").exists());

        let store = CsvStore::open(&app.storage.data_dir).unwrap();
        assert_eq!(store.load(Series::Sofr).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let today = ymd(2024, 1, 9);
        let healthy = healthy_sources(today);
        let fetchers: Vec<&dyn Fetcher> = healthy.iter().map(|f| f as &dyn Fetcher).collect();
        let notifier = StubNotifier {
            fail: true,
            ..Default::default()
        };

        let summary = execute(&app, &fetchers, Some(&notifier), today).await;
        tokio_test::assert_ok!(summary);
    }

    #[test]
    fn test_warning_text() {
        assert!(warning_text(&[], &[], 3).is_none());

        let text = warning_text(&[("fred".to_string(), 4)], &[], 3).unwrap();
        assert!(text.contains("failing 3 or more"));
        assert!(text.contains("• fred: 4 consecutive failures"));
    }
}

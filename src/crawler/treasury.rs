use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use csv::ReaderBuilder;

use crate::{
    crawler::{Batch, DateWindow, Fetcher, Record},
    declare::{Series, Source},
    error::FetchError,
    logging,
    util::{self, datetime},
};

/// 每年一個 CSV 檔，日期格式為 MM/DD/YYYY，最新的日期在最上面
fn url(year: i32) -> String {
    format!(
        "https://home.treasury.gov/resource-center/data-chart-center/interest-rates/daily-treasury-rates.csv/{year}/all?type=daily_treasury_yield_curve&field_tdr_date_value={year}&page&_format=csv"
    )
}

/// 一天的殖利率曲線，期別依 `Series::treasury_curve` 排序
#[derive(Debug, Clone, PartialEq)]
pub struct CurveRow {
    pub date: NaiveDate,
    pub as_of: String,
    pub yields: Vec<(Series, String)>,
}

impl CurveRow {
    fn into_records(self) -> Vec<Record> {
        let as_of = self.as_of;
        self.yields
            .into_iter()
            .map(|(series, value)| Record::percent(series, as_of.as_str(), value))
            .collect()
    }
}

/// 解析財政部的 CSV，欄位名稱即為期別 (例︰"1 Mo"、"10 Yr")，空白儲存格略過
pub fn parse_csv(text: &str) -> Result<Vec<CurveRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().context("Failed to read treasury csv header")?.clone();
    let date_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("date"))
        .ok_or_else(|| anyhow!("Date column not found in treasury csv"))?;

    let columns: Vec<(usize, Series)> = Series::treasury_curve()
        .into_iter()
        .filter_map(|series| {
            headers
                .iter()
                .position(|h| h == series.name())
                .map(|idx| (idx, series))
        })
        .collect();

    if columns.is_empty() {
        return Err(anyhow!("No maturity column found in treasury csv"));
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read treasury csv row {}", line + 2))?;
        let Some(as_of) = record.get(date_idx) else {
            continue;
        };

        let date = match datetime::parse_date(as_of) {
            Ok(date) => date,
            Err(why) => {
                logging::warn_file_async(format!("Skip treasury row {}: {:?}", line + 2, why));
                continue;
            }
        };

        let yields: Vec<(Series, String)> = columns
            .iter()
            .filter_map(|(idx, series)| {
                record
                    .get(*idx)
                    .filter(|v| !v.is_empty() && *v != "N/A")
                    .map(|v| (*series, v.to_string()))
            })
            .collect();

        if !yields.is_empty() {
            rows.push(CurveRow {
                date,
                as_of: as_of.to_string(),
                yields,
            });
        }
    }

    Ok(rows)
}

/// 取得指定年份的殖利率曲線
pub async fn visit(year: i32) -> Result<Vec<CurveRow>> {
    let text = util::http::get(&url(year), None).await?;
    parse_csv(&text)
}

/// 區間內最新的一天
fn latest_in(rows: Vec<CurveRow>, window: &DateWindow) -> Option<CurveRow> {
    rows.into_iter()
        .filter(|row| row.date <= window.to)
        .max_by_key(|row| row.date)
}

/// 當年度還沒有資料或請求失敗時回傳 None，改看前一年
fn usable_current(current: Result<Vec<CurveRow>>, window: &DateWindow) -> Option<CurveRow> {
    match current {
        Ok(rows) => latest_in(rows, window),
        Err(why) => {
            logging::warn_file_async(format!(
                "Failed to get treasury yield curve of {} because {:?}, try the year before",
                window.to.year(),
                why
            ));
            None
        }
    }
}

async fn latest(window: &DateWindow) -> Result<Vec<Record>> {
    let year = window.to.year();
    if let Some(row) = usable_current(visit(year).await, window) {
        return Ok(row.into_records());
    }

    let previous = visit(year - 1)
        .await
        .with_context(|| format!("Failed to get treasury yield curve of {}", year - 1))?;

    latest_in(previous, window)
        .map(CurveRow::into_records)
        .ok_or_else(|| anyhow!("No treasury yield curve published before {}", window.to))
}

async fn history(window: &DateWindow) -> Batch {
    let mut results = Vec::new();
    for year in window.years() {
        results.push((year, visit(year).await));
    }

    collect_years(results, window)
}

/// 失敗的年份單獨回報，其他年份照常寫入
fn collect_years(
    results: impl IntoIterator<Item = (i32, Result<Vec<CurveRow>>)>,
    window: &DateWindow,
) -> Batch {
    let mut batch = Batch::default();

    for (year, result) in results {
        match result {
            Ok(rows) => batch.records.extend(
                rows.into_iter()
                    .filter(|row| window.contains(row.date))
                    .flat_map(CurveRow::into_records),
            ),
            Err(why) => {
                logging::error_file_async(format!(
                    "Failed to get treasury yield curve of {} because {:?}",
                    year, why
                ));
                batch.push_failure(FetchError::new(
                    Source::Treasury,
                    format!("{}: {:#}", year, why),
                ));
            }
        }
    }

    batch
}

pub struct Treasury;

#[async_trait]
impl Fetcher for Treasury {
    fn source(&self) -> Source {
        Source::Treasury
    }

    fn serves_history(&self) -> bool {
        true
    }

    async fn fetch(&self, window: &DateWindow) -> Result<Batch, FetchError> {
        if !window.is_single_day() {
            return history(window).await.into_result(self.source());
        }

        latest(window)
            .await
            .map(Batch::from)
            .map_err(|why| FetchError::from_anyhow(self.source(), why))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Date,\"1 Mo\",\"1.5 Month\",\"2 Mo\",\"3 Mo\",\"4 Mo\",\"6 Mo\",\"1 Yr\",\"2 Yr\",\"3 Yr\",\"5 Yr\",\"7 Yr\",\"10 Yr\",\"20 Yr\",\"30 Yr\"
01/03/2024,5.54,,5.48,5.47,5.41,5.24,4.82,4.33,4.10,3.94,3.95,3.91,4.18,4.05
01/02/2024,5.55,,5.54,5.46,5.41,5.24,4.80,4.33,4.09,3.93,3.95,3.95,4.23,4.08
12/29/2023,5.60,,5.59,5.40,5.41,5.26,4.79,4.23,4.01,3.84,3.88,3.88,4.20,4.03
";

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_csv() {
        let rows = parse_csv(CSV).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, ymd(2024, 1, 3));
        assert_eq!(rows[0].yields.len(), 12);
        assert_eq!(rows[0].yields[0], (Series::Ust1M, "5.54".to_string()));
        assert_eq!(rows[0].yields[11], (Series::Ust30Y, "4.05".to_string()));
    }

    #[test]
    fn test_blank_cells_are_skipped() {
        let csv = "Date,1 Mo,2 Mo,3 Mo\n10/10/2025,,4.10,4.02\n";
        let rows = parse_csv(csv).unwrap();
        assert_eq!(
            rows[0].yields,
            vec![(Series::Ust2M, "4.10".to_string()), (Series::Ust3M, "4.02".to_string())]
        );
    }

    #[test]
    fn test_latest_in_window() {
        let rows = parse_csv(CSV).unwrap();
        let window = DateWindow::today(ymd(2024, 1, 2));
        let row = latest_in(rows, &window).unwrap();
        assert_eq!(row.as_of, "01/02/2024");

        let records = row.into_records();
        assert_eq!(records.len(), 12);
        assert_eq!(records[9], Record::percent(Series::Ust10Y, "01/02/2024", "3.95"));
    }

    #[test]
    fn test_failed_or_empty_current_year_falls_back() {
        let window = DateWindow::today(ymd(2024, 1, 2));
        assert!(usable_current(Err(anyhow!("status 503")), &window).is_none());
        assert!(usable_current(Ok(Vec::new()), &window).is_none());

        let row = usable_current(parse_csv(CSV), &window).unwrap();
        assert_eq!(row.date, ymd(2024, 1, 2));
    }

    #[test]
    fn test_failed_year_keeps_the_other_years() {
        let window = DateWindow::new(ymd(2023, 12, 1), ymd(2024, 1, 3)).unwrap();
        let rows_2024: Vec<CurveRow> = parse_csv(CSV)
            .unwrap()
            .into_iter()
            .filter(|row| row.date.year() == 2024)
            .collect();

        let batch = collect_years(
            vec![(2023, Err(anyhow!("timeout"))), (2024, Ok(rows_2024))],
            &window,
        );

        assert_eq!(batch.records.len(), 24);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].reason, "2023: timeout");
        assert!(batch.clone().into_result(Source::Treasury).is_ok());

        let all_failed = collect_years(vec![(2024, Err(anyhow!("timeout")))], &window);
        assert!(all_failed.into_result(Source::Treasury).is_err());
    }

    #[test]
    fn test_csv_without_maturities() {
        assert!(parse_csv("Date,Foo\n01/02/2024,1\n").is_err());
    }
}

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::NaiveDate;
use csv::{ReaderBuilder, WriterBuilder};
use rust_decimal::Decimal;
use strum::IntoEnumIterator;

use crate::{
    declare::Series,
    error::StorageError,
    history::{HistoricalTable, Upsert},
};

const HEADER: [&str; 2] = ["date", "value"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// 每個序列一個 CSV 檔：`<data_dir>/<SERIES_ID>.csv`
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    /// 目錄不存在時會建立
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Write {
            path: dir.clone(),
            source,
        })?;

        Ok(CsvStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, series: Series) -> PathBuf {
        self.dir.join(format!("{}.csv", series.id()))
    }

    /// 讀取歷史資料，檔案不存在視為空的資料表
    pub fn load(&self, series: Series) -> Result<HistoricalTable, StorageError> {
        let path = self.path_of(series);
        if !path.exists() {
            return Ok(HistoricalTable::new(series));
        }

        let text = fs::read_to_string(&path).map_err(|source| StorageError::Read {
            path: path.clone(),
            source,
        })?;

        decode(series, &path, &text)
    }

    /// 所有序列的歷史資料
    pub fn load_all(&self) -> Result<Vec<HistoricalTable>, StorageError> {
        Series::iter().map(|series| self.load(series)).collect()
    }

    /// 以暫存檔寫入後 rename，寫入過程中斷不會留下半個檔案
    pub fn save(&self, table: &HistoricalTable) -> Result<(), StorageError> {
        let path = self.path_of(table.series());
        let bytes = encode(table, &path)?;
        write_atomic(&path, &bytes)
    }
}

fn decode(series: Series, path: &Path, text: &str) -> Result<HistoricalTable, StorageError> {
    let corrupt = |line: u64, reason: String| StorageError::Corrupt {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|why| corrupt(1, why.to_string()))?;
    if headers.iter().collect::<Vec<_>>() != HEADER {
        return Err(corrupt(1, format!("unexpected header {:?}", headers)));
    }

    let mut table = HistoricalTable::new(series);
    for (idx, record) in reader.records().enumerate() {
        let fallback_line = idx as u64 + 2;
        let record = record.map_err(|why| {
            let line = why.position().map(|p| p.line()).unwrap_or(fallback_line);
            corrupt(line, why.to_string())
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);

        let (Some(date), Some(value), 2) = (record.get(0), record.get(1), record.len()) else {
            return Err(corrupt(line, format!("expected 2 fields, got {}", record.len())));
        };

        let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|why| corrupt(line, format!("bad date '{}': {}", date, why)))?;
        let value = Decimal::from_str(value)
            .map_err(|why| corrupt(line, format!("bad value '{}': {}", value, why)))?;

        if table.upsert(date, value) != Upsert::Inserted {
            return Err(corrupt(line, format!("duplicate date {}", date)));
        }
    }

    Ok(table)
}

fn encode(table: &HistoricalTable, path: &Path) -> Result<Vec<u8>, StorageError> {
    let encode_error = |why: csv::Error| StorageError::Encode {
        path: path.to_path_buf(),
        reason: why.to_string(),
    };

    let mut writer = WriterBuilder::new().from_writer(Vec::with_capacity(table.len() * 20));
    writer.write_record(HEADER).map_err(encode_error)?;
    for observation in table.iter() {
        writer
            .write_record([
                observation.date.format(DATE_FORMAT).to_string(),
                observation.value.to_string(),
            ])
            .map_err(encode_error)?;
    }

    writer.into_inner().map_err(|why| StorageError::Encode {
        path: path.to_path_buf(),
        reason: why.to_string(),
    })
}

/// 寫入暫存檔、fsync、rename，最後 fsync 所在目錄
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let write_error = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "data".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = File::create(&tmp).map_err(write_error)?;
    file.write_all(bytes).map_err(write_error)?;
    file.sync_all().map_err(write_error)?;
    drop(file);

    if let Err(why) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(write_error(why));
    }

    sync_parent(path).map_err(write_error)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => File::open(parent)?.sync_all(),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sofr() -> HistoricalTable {
        let mut t = HistoricalTable::new(Series::Sofr);
        t.upsert(ymd(2024, 1, 3), dec!(5.38));
        t.upsert(ymd(2024, 1, 2), dec!(5.4));
        t
    }

    #[test]
    fn test_missing_file_is_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).unwrap();
        let table = store.load(Series::Hibor1M).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.series(), Series::Hibor1M);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path().join("data")).unwrap();
        store.save(&sofr()).unwrap();

        let text = fs::read_to_string(store.path_of(Series::Sofr)).unwrap();
        assert_eq!(text, "date,value\n2024-01-02,5.4\n2024-01-03,5.38\n");
        assert_eq!(store.load(Series::Sofr).unwrap(), sofr());

        // 暫存檔不會留下
        let files: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_save_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).unwrap();
        let path = store.path_of(Series::Sofr);

        store.save(&sofr()).unwrap();
        let first = fs::read(&path).unwrap();
        store.save(&store.load(Series::Sofr).unwrap()).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_corrupt_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).unwrap();
        fs::write(
            store.path_of(Series::Sofr),
            "date,value\n2024-01-02,5.4\n2024-01-03,abc\n",
        )
        .unwrap();

        match store.load(Series::Sofr) {
            Err(StorageError::Corrupt { line, reason, .. }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("abc"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_date_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).unwrap();
        fs::write(
            store.path_of(Series::Sofr),
            "date,value\n2024-01-02,5.4\n2024-01-02,5.5\n",
        )
        .unwrap();

        assert!(matches!(
            store.load(Series::Sofr),
            Err(StorageError::Corrupt { line: 3, .. })
        ));
    }

    #[test]
    fn test_bad_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).unwrap();
        fs::write(store.path_of(Series::Sofr), "day,rate\n2024-01-02,5.4\n").unwrap();

        assert!(matches!(
            store.load(Series::Sofr),
            Err(StorageError::Corrupt { line: 1, .. })
        ));
    }

    #[test]
    fn test_load_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).unwrap();
        store.save(&sofr()).unwrap();

        let tables = store.load_all().unwrap();
        assert_eq!(tables.len(), Series::iter().count());
        assert_eq!(tables.iter().filter(|t| !t.is_empty()).count(), 1);
    }
}

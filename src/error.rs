use std::{io, path::PathBuf};

use thiserror::Error;

use crate::declare::{Series, Source};

/// 單一來源抓取失敗，不影響其他來源
///
/// `series` 為 None 表示整個來源都失敗；有值時只有該序列沒有拿到資料。
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{origin}: {reason}")]
pub struct FetchError {
    pub origin: Source,
    pub series: Option<Series>,
    pub reason: String,
}

impl FetchError {
    pub fn new(origin: Source, reason: impl Into<String>) -> Self {
        Self {
            origin,
            series: None,
            reason: reason.into(),
        }
    }

    /// 來源中單一序列失敗，reason 以序列代號開頭
    pub fn for_series(series: Series, reason: impl AsRef<str>) -> Self {
        Self {
            origin: series.source(),
            series: Some(series),
            reason: format!("{}: {}", series, reason.as_ref()),
        }
    }

    /// 將 `anyhow` 的錯誤鏈攤平成一行文字
    pub fn from_anyhow(origin: Source, why: anyhow::Error) -> Self {
        Self::new(origin, format!("{:#}", why))
    }

    /// 這個失敗是否讓 `series` 沒有新資料
    pub fn covers(&self, series: Series) -> bool {
        self.origin == series.source() && self.series.map_or(true, |s| s == series)
    }

    /// 報表上的名稱，單一序列失敗時顯示序列名稱
    pub fn label(&self) -> &'static str {
        match self.series {
            Some(series) => series.name(),
            None => self.origin.name(),
        }
    }
}

/// 不合格的觀測值，會被回報但不會中止整批
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{series} {date}: {reason}")]
pub struct ValidationError {
    pub series: Series,
    pub date: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(series: Series, date: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            series,
            date: date.into(),
            reason: reason.into(),
        }
    }
}

/// 寫入或讀取歷史資料失敗，會中止整個執行
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt row at line {line} of {}: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("failed to encode {}: {reason}", path.display())]
    Encode { path: PathBuf, reason: String },
}

/// 訊息發送失敗，資料已落地所以只記錄
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    #[error("telegram credentials are not configured")]
    NotConfigured,

    #[error("failed to deliver to {target}: {reason}")]
    Failed { target: String, reason: String },
}

/// 整個執行失敗，對應到 process 的 exit code
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid arguments: {0}")]
    Arguments(String),
}

impl RunError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Storage(_) | Self::Config(_) | Self::Arguments(_) => 2,
        }
    }
}

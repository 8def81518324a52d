use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config::{Config as config_config, File as config_file};
use serde::{Deserialize, Serialize};

use crate::logging;

const CONFIG_PATH: &str = "app.json";

/// 執行期設定，啟動時讀取一次之後不再變動
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct App {
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub fred: Fred,
    #[serde(default)]
    pub bot: Bot,
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub health: Health,
}

const DATA_DIR: &str = "DATA_DIR";
const REPORTS_DIR: &str = "REPORTS_DIR";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Storage {
    pub data_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            reports_dir: PathBuf::from("reports"),
        }
    }
}

const FRED_API_KEY: &str = "FRED_API_KEY";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct Fred {
    #[serde(default)]
    pub api_key: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct Bot {
    #[serde(default)]
    pub telegram: Telegram,
}

const TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
const TELEGRAM_ALLOWED: &str = "TELEGRAM_ALLOWED";
const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct Telegram {
    /// chat id => 備註名稱
    #[serde(default)]
    pub allowed: HashMap<i64, String>,
    #[serde(default)]
    pub token: String,
}

impl Telegram {
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty() && !self.allowed.is_empty()
    }
}

const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Http {
    /// 單次請求的逾時秒數
    pub timeout_secs: u64,
}

impl Default for Http {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Http {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

const HEALTH_ALERT_THRESHOLD: &str = "HEALTH_ALERT_THRESHOLD";
const HEALTH_STALE_DAYS: &str = "HEALTH_STALE_DAYS";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Health {
    /// 連續失敗幾次後發出警告
    pub alert_threshold: u32,
    /// 超過幾天沒有新資料視為過期
    pub stale_days: i64,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            alert_threshold: 3,
            stale_days: 3,
        }
    }
}

impl App {
    /// 讀取 app.json (若存在) 後再以環境變數覆蓋
    pub fn load() -> Result<Self> {
        Ok(Self::load_from(&config_path())?.override_with_env())
    }

    /// 讀取指定的設定檔，檔案不存在時使用預設值
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(App::default());
        }

        config_config::builder()
            .add_source(config_file::from(path))
            .build()
            .and_then(|c| c.try_deserialize::<App>())
            .with_context(|| format!("Failed to read the config from {}", path.display()))
    }

    /// 將來至於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with_env(self) -> Self {
        self.override_with(|key| env::var(key).ok())
    }

    fn override_with(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = var(DATA_DIR) {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Some(dir) = var(REPORTS_DIR) {
            self.storage.reports_dir = PathBuf::from(dir);
        }

        if let Some(key) = var(FRED_API_KEY) {
            self.fred.api_key = key;
        }

        if let Some(token) = var(TELEGRAM_TOKEN) {
            self.bot.telegram.token = token;
        }

        if let Some(tg_allowed) = var(TELEGRAM_ALLOWED) {
            match serde_json::from_str::<HashMap<i64, String>>(&tg_allowed) {
                Ok(allowed) => {
                    self.bot.telegram.allowed = allowed;
                }
                Err(why) => {
                    logging::error_file_async(format!(
                        "Failed to serde_json because: {:?} \r\n {}",
                        why, &tg_allowed
                    ));
                }
            }
        }

        if let Some(chat_id) = var(TELEGRAM_CHAT_ID) {
            match chat_id.trim().parse::<i64>() {
                Ok(id) => {
                    self.bot.telegram.allowed.insert(id, String::from("default"));
                }
                Err(why) => {
                    logging::error_file_async(format!(
                        "Failed to parse {} '{}' because {:?}",
                        TELEGRAM_CHAT_ID, chat_id, why
                    ));
                }
            }
        }

        if let Some(timeout) = var(REQUEST_TIMEOUT) {
            self.http.timeout_secs = timeout.parse::<u64>().unwrap_or(30);
        }

        if let Some(threshold) = var(HEALTH_ALERT_THRESHOLD) {
            self.health.alert_threshold = threshold.parse::<u32>().unwrap_or(3);
        }

        if let Some(days) = var(HEALTH_STALE_DAYS) {
            self.health.stale_days = days.parse::<i64>().unwrap_or(3);
        }

        self
    }
}

/// 回傳設定檔的路徑
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let app = App::load_from(Path::new("does-not-exist.json")).unwrap();
        assert_eq!(app.storage.data_dir, PathBuf::from("data"));
        assert_eq!(app.storage.reports_dir, PathBuf::from("reports"));
        assert_eq!(app.http.timeout(), Duration::from_secs(30));
        assert_eq!(app.health.alert_threshold, 3);
        assert!(!app.bot.telegram.is_configured());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(
            &path,
            r#"{
                "storage": { "data_dir": "/var/lib/rates" },
                "fred": { "api_key": "abc" },
                "bot": { "telegram": { "token": "t" } },
                "http": { "timeout_secs": 5 }
            }"#,
        )
        .unwrap();

        let app = App::load_from(&path).unwrap();
        assert_eq!(app.storage.data_dir, PathBuf::from("/var/lib/rates"));
        assert_eq!(app.storage.reports_dir, PathBuf::from("reports"));
        assert_eq!(app.fred.api_key, "abc");
        assert_eq!(app.http.timeout_secs, 5);
        assert_eq!(app.bot.telegram.token, "t");
        assert!(!app.bot.telegram.is_configured());
        assert_eq!(app.health.stale_days, 3);
    }

    #[test]
    fn test_override_with_env() {
        let app = App::default().override_with(vars(&[
            (DATA_DIR, "/tmp/data"),
            (FRED_API_KEY, "key"),
            (TELEGRAM_TOKEN, "token"),
            (TELEGRAM_ALLOWED, r#"{"123":"QQ"}"#),
            (TELEGRAM_CHAT_ID, "456"),
            (REQUEST_TIMEOUT, "not-a-number"),
            (HEALTH_STALE_DAYS, "5"),
        ]));

        assert_eq!(app.storage.data_dir, PathBuf::from("/tmp/data"));
        assert_eq!(app.fred.api_key, "key");
        assert_eq!(app.bot.telegram.allowed.len(), 2);
        assert!(app.bot.telegram.allowed.contains_key(&456));
        assert_eq!(app.http.timeout_secs, 30);
        assert_eq!(app.health.stale_days, 5);
    }
}

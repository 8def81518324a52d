use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Datelike, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::{
    crawler::{Batch, DateWindow, Fetcher, Record},
    declare::{Series, Source},
    error::FetchError,
    logging,
    util::{self, text},
};

const MONTHS: &str =
    "January|February|March|April|May|June|July|August|September|October|November|December";

/// 推廣月份，例︰"Promotion for Selected Individual Customers (February 2026)"
static PROMO_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)Promotion\s+for\s+Selected\s+Individual\s+Customers\s*\(\s*({})\s+(\d{{4}})\s*\)",
        MONTHS
    ))
    .expect("Failed to compile promo month regex")
});

/// 登記截止日，例︰"now until 6 March 2026"
static REGISTRATION_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)now\s+until\s+(\d{{1,2}})\s+({})\s+(\d{{4}})",
        MONTHS
    ))
    .expect("Failed to compile registration end regex")
});

/// 條款表一︰"HK$200,000 to HK$10,000,000 +2.875%"
static HKD_RATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"HK\$\d[\d,]*\s*(?:to|-)\s*HK\$\d[\d,]*\s*\+?(\d+(?:\.\d+)?)\s*%")
        .expect("Failed to compile HKD rate regex")
});

static USD_RATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"US\$\d[\d,]*\s*(?:to|-)\s*US\$\d[\d,]*\s*\+?(\d+(?:\.\d+)?)\s*%")
        .expect("Failed to compile USD rate regex")
});

/// 例子表格中的 "Up to 3.00%"
static UP_TO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Up\s+to\s+(\d+(?:\.\d+)?)\s*%").expect("Failed to compile up-to regex")
});

/// "Up to" 往前看多少字元找幣別
const CURRENCY_CONTEXT_CHARS: usize = 200;

/// 現有客戶 (ETB) 的條款 PDF，每月一份
fn url(month: NaiveDate) -> String {
    format!(
        "https://www.dbs.com.hk/iwov-resources/pdf/deposits/{}_eSaver_ETB_Generic_TC.pdf",
        month.format("%Y%m")
    )
}

/// 一期 e$aver 推廣
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    /// 推廣月份的第一天
    pub month: NaiveDate,
    pub registration_end: Option<NaiveDate>,
    pub hkd_rate: Option<Decimal>,
    pub usd_rate: Option<Decimal>,
    pub max_total_hkd: Option<Decimal>,
    pub max_total_usd: Option<Decimal>,
}

impl Promotion {
    /// 以推廣月份第一天為日期，同一個月份重複抓取會覆蓋同一筆
    pub fn to_records(&self) -> Vec<Record> {
        let as_of = self.month.format("%Y-%m-%d").to_string();
        [
            (Series::EsaverHkd, self.hkd_rate),
            (Series::EsaverUsd, self.usd_rate),
        ]
        .into_iter()
        .filter_map(|(series, rate)| {
            rate.map(|r| Record::percent(series, as_of.as_str(), r.to_string()))
        })
        .collect()
    }
}

fn parse_day(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{} {} {}", day, month, year), "%d %B %Y").ok()
}

fn capture_rate(regex: &Regex, text: &str) -> Option<Decimal> {
    let caps = regex.captures(text)?;
    text::parse_decimal(caps.get(1)?.as_str(), None).ok()
}

/// `text` 結尾最多 `max_chars` 個字元
fn tail(text: &str, max_chars: usize) -> &str {
    match text.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// 每個 "Up to X%" 依前文最後出現的幣別歸類，各取最大值
fn max_totals(text: &str) -> (Option<Decimal>, Option<Decimal>) {
    let mut hkd: Option<Decimal> = None;
    let mut usd: Option<Decimal> = None;

    for caps in UP_TO.captures_iter(text) {
        let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(value) = text::parse_decimal(value.as_str(), None) else {
            continue;
        };

        let context = tail(&text[..whole.start()], CURRENCY_CONTEXT_CHARS);
        let target = match (context.rfind("HK$"), context.rfind("US$")) {
            (Some(hk), Some(us)) if hk > us => &mut hkd,
            (Some(_), None) => &mut hkd,
            (_, Some(_)) => &mut usd,
            (None, None) => continue,
        };
        *target = Some(target.map_or(value, |current| current.max(value)));
    }

    (hkd, usd)
}

/// 解析條款 PDF 的文字
pub fn parse(text: &str) -> Result<Promotion> {
    let caps = PROMO_MONTH
        .captures(text)
        .ok_or_else(|| anyhow!("Promotion month not found in the e$aver T&C"))?;
    let month = match (caps.get(1), caps.get(2)) {
        (Some(m), Some(y)) => parse_day("1", m.as_str(), y.as_str()),
        _ => None,
    }
    .ok_or_else(|| anyhow!("Invalid promotion month '{}'", &caps[0]))?;

    let registration_end = REGISTRATION_END
        .captures(text)
        .and_then(|c| parse_day(c.get(1)?.as_str(), c.get(2)?.as_str(), c.get(3)?.as_str()));

    let hkd_rate = capture_rate(&HKD_RATE, text);
    let usd_rate = capture_rate(&USD_RATE, text);
    if hkd_rate.is_none() && usd_rate.is_none() {
        return Err(anyhow!("No e$aver rate in the T&C of {}", month.format("%Y-%m")));
    }

    let (max_total_hkd, max_total_usd) = max_totals(text);

    Ok(Promotion {
        month,
        registration_end,
        hkd_rate,
        usd_rate,
        max_total_hkd,
        max_total_usd,
    })
}

fn extract_text(pdf: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(pdf)
        .map_err(|why| anyhow!("Failed to extract text from the e$aver T&C because {:?}", why))
}

/// 取得指定月份的推廣條款
pub async fn visit(month: NaiveDate) -> Result<Promotion> {
    let pdf = util::http::get_bytes(&url(month)).await?;
    parse(&extract_text(&pdf)?)
}

/// 當月的條款還沒上架時改看上個月
async fn current(today: NaiveDate) -> Result<Promotion> {
    let this_month = today
        .with_day(1)
        .ok_or_else(|| anyhow!("Invalid date {}", today))?;
    let last_month = this_month
        .checked_sub_months(Months::new(1))
        .ok_or_else(|| anyhow!("Invalid date {}", this_month))?;

    let mut failures = Vec::with_capacity(2);
    for month in [this_month, last_month] {
        match visit(month).await {
            Ok(promotion) => {
                logging::info_file_async(format!(
                    "DBS e$aver {}: HKD +{:?}% USD +{:?}% max HKD {:?}% max USD {:?}% register by {:?}",
                    promotion.month.format("%Y-%m"),
                    promotion.hkd_rate,
                    promotion.usd_rate,
                    promotion.max_total_hkd,
                    promotion.max_total_usd,
                    promotion.registration_end
                ));
                return Ok(promotion);
            }
            Err(why) => {
                logging::warn_file_async(format!(
                    "Failed to get the e$aver T&C of {} because {:?}",
                    month.format("%Y-%m"),
                    why
                ));
                failures.push(format!("{}: {:#}", month.format("%Y-%m"), why));
            }
        }
    }

    Err(anyhow!("No e$aver T&C available ({})", failures.join("; ")))
}

/// 條款只有當期，沒有歷史資料
pub struct DbsEsaver;

#[async_trait]
impl Fetcher for DbsEsaver {
    fn source(&self) -> Source {
        Source::DbsEsaver
    }

    async fn fetch(&self, window: &DateWindow) -> Result<Batch, FetchError> {
        current(window.to)
            .await
            .map(|promotion| Batch::from(promotion.to_records()))
            .map_err(|why| FetchError::from_anyhow(self.source(), why))
    }
}

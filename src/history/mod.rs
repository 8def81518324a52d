use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeDelta};
use rust_decimal::Decimal;

use crate::declare::Series;

/// 合併新資料
pub mod merge;
/// 將抓回來的文字轉為觀測值
pub mod normalize;

/// 單一序列在某一天的數值 (百分比)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub series: Series,
    pub date: NaiveDate,
    pub value: Decimal,
}

impl Observation {
    pub fn new(series: Series, date: NaiveDate, value: Decimal) -> Self {
        Observation {
            series,
            date,
            value,
        }
    }
}

/// upsert 的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    Unchanged,
}

/// 一個序列的歷史資料，依日期排序且每天最多一筆
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalTable {
    series: Series,
    rows: BTreeMap<NaiveDate, Decimal>,
}

impl HistoricalTable {
    pub fn new(series: Series) -> Self {
        HistoricalTable {
            series,
            rows: BTreeMap::new(),
        }
    }

    pub fn series(&self) -> Series {
        self.series
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 同一天已有資料就覆蓋，沒有就新增
    pub fn upsert(&mut self, date: NaiveDate, value: Decimal) -> Upsert {
        match self.rows.get(&date) {
            Some(previous) if *previous == value => Upsert::Unchanged,
            Some(_) => {
                self.rows.insert(date, value);
                Upsert::Updated
            }
            None => {
                self.rows.insert(date, value);
                Upsert::Inserted
            }
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<Decimal> {
        self.rows.get(&date).copied()
    }

    pub fn first(&self) -> Option<Observation> {
        self.rows
            .first_key_value()
            .map(|(d, v)| Observation::new(self.series, *d, *v))
    }

    pub fn latest(&self) -> Option<Observation> {
        self.rows
            .last_key_value()
            .map(|(d, v)| Observation::new(self.series, *d, *v))
    }

    /// 指定日期當天或之前最近的一筆
    pub fn value_on_or_before(&self, date: NaiveDate) -> Option<Observation> {
        self.rows
            .range(..=date)
            .next_back()
            .map(|(d, v)| Observation::new(self.series, *d, *v))
    }

    /// 最新值與 `days` 天前 (當天或之前最近一筆) 的差
    pub fn change_over(&self, days: i64) -> Option<Decimal> {
        let latest = self.latest()?;
        let base = self.value_on_or_before(latest.date - TimeDelta::days(days))?;
        Some(latest.value - base.value)
    }

    /// 最後 n 筆，依日期由舊到新
    pub fn tail(&self, n: usize) -> Vec<Observation> {
        let skip = self.rows.len().saturating_sub(n);
        self.iter().skip(skip).collect()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Observation> + '_ {
        self.rows
            .iter()
            .map(|(d, v)| Observation::new(self.series, *d, *v))
    }
}

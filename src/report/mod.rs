use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate};
use rust_decimal::Decimal;
use strum::IntoEnumIterator;

use crate::{
    declare::{Section, Series},
    error::FetchError,
    health::Staleness,
    history::{HistoricalTable, Observation},
};

/// HTML 報表
pub mod html;
/// Telegram 摘要
pub mod summary;

/// 走勢圖使用的筆數
pub const SPARKLINE_POINTS: usize = 30;

/// 報表中的一列 (一個序列)
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub series: Series,
    pub latest: Option<Observation>,
    pub change_1d: Option<Decimal>,
    pub change_7d: Option<Decimal>,
    pub change_30d: Option<Decimal>,
    pub sparkline: Vec<Decimal>,
    /// 本次沒有拿到這個序列的新資料
    pub unavailable: bool,
}

impl Row {
    pub fn new(table: &HistoricalTable, unavailable: bool) -> Self {
        Row {
            series: table.series(),
            latest: table.latest(),
            change_1d: table.change_over(1),
            change_7d: table.change_over(7),
            change_30d: table.change_over(30),
            sparkline: table
                .tail(SPARKLINE_POINTS)
                .into_iter()
                .map(|o| o.value)
                .collect(),
            unavailable,
        }
    }

    /// 本次有可用的數值
    pub fn current(&self) -> Option<Decimal> {
        if self.unavailable {
            return None;
        }

        self.latest.map(|o| o.value)
    }
}

/// 一次執行的報表內容
#[derive(Debug, Clone)]
pub struct Report {
    pub date: NaiveDate,
    pub generated_at: DateTime<Local>,
    pub sections: Vec<(Section, Vec<Row>)>,
    pub failed_sources: Vec<FetchError>,
    pub stale: Vec<Staleness>,
}

/// 產出的文件，HTML 為附件，summary 為訊息本文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub caption: String,
    pub html: String,
    pub summary: String,
}

impl Report {
    pub fn build(
        date: NaiveDate,
        tables: &[HistoricalTable],
        failed_sources: &[FetchError],
        stale: Vec<Staleness>,
    ) -> Self {
        let by_series: BTreeMap<Series, &HistoricalTable> =
            tables.iter().map(|t| (t.series(), t)).collect();

        let sections = Section::iter()
            .map(|section| {
                let rows = section
                    .series()
                    .map(|series| {
                        let unavailable = failed_sources.iter().any(|f| f.covers(series));
                        match by_series.get(&series) {
                            Some(table) => Row::new(table, unavailable),
                            None => Row::new(&HistoricalTable::new(series), unavailable),
                        }
                    })
                    .collect();
                (section, rows)
            })
            .collect();

        Report {
            date,
            generated_at: Local::now(),
            sections,
            failed_sources: failed_sources.to_vec(),
            stale,
        }
    }

    pub fn row(&self, series: Series) -> Option<&Row> {
        self.sections
            .iter()
            .flat_map(|(_, rows)| rows.iter())
            .find(|row| row.series == series)
    }

    pub fn render(&self) -> Document {
        Document {
            file_name: format!("{}.html", self.date.format("%Y-%m-%d")),
            caption: format!("Interest Rate Monitor Report {}", self.date.format("%Y-%m-%d")),
            html: html::render(self),
            summary: summary::render(self),
        }
    }
}

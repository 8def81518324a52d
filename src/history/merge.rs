use crate::{
    declare::Series,
    error::ValidationError,
    history::{HistoricalTable, Observation, Upsert},
};

/// 合併後的資料表與統計
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub table: HistoricalTable,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: Vec<ValidationError>,
}

impl MergeOutcome {
    /// 資料表是否有變動，沒有變動就不必寫檔
    pub fn is_modified(&self) -> bool {
        self.inserted > 0 || self.updated > 0
    }
}

/// 檢查觀測值是否屬於這個序列且落在合理範圍
pub fn validate(series: Series, observation: &Observation) -> Result<(), ValidationError> {
    let date = observation.date.to_string();

    if observation.series != series {
        return Err(ValidationError::new(
            series,
            date,
            format!("observation belongs to {}", observation.series),
        ));
    }

    if observation.value < series.floor() {
        let reason = if series.floor().is_zero() {
            format!("negative rate {}", observation.value)
        } else {
            format!(
                "value {} is below the floor {}",
                observation.value,
                series.floor()
            )
        };
        return Err(ValidationError::new(series, date, reason));
    }

    if observation.value > series.ceiling() {
        return Err(ValidationError::new(
            series,
            date,
            format!(
                "rate {} is above the ceiling {}",
                observation.value,
                series.ceiling()
            ),
        ));
    }

    Ok(())
}

/// 以 (序列, 日期) 為鍵 upsert，同一天的新值覆蓋舊值
///
/// 合併同一批資料兩次與合併一次的結果相同；空的輸入不改變資料表。
pub fn merge(existing: HistoricalTable, incoming: &[Observation]) -> MergeOutcome {
    let series = existing.series();
    let mut outcome = MergeOutcome {
        table: existing,
        inserted: 0,
        updated: 0,
        unchanged: 0,
        rejected: Vec::new(),
    };

    for observation in incoming {
        if let Err(why) = validate(series, observation) {
            outcome.rejected.push(why);
            continue;
        }

        match outcome.table.upsert(observation.date, observation.value) {
            Upsert::Inserted => outcome.inserted += 1,
            Upsert::Updated => outcome.updated += 1,
            Upsert::Unchanged => outcome.unchanged += 1,
        }
    }

    outcome
}

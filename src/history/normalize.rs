use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{
    crawler::Record,
    declare::Unit,
    error::ValidationError,
    history::Observation,
    util::{datetime, text},
};

/// 轉換結果，不合格的資料只回報不中止
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Normalized {
    pub observations: Vec<Observation>,
    pub rejected: Vec<ValidationError>,
}

/// 解析日期與數值、統一單位為百分比，並排除未來的日期
pub fn normalize(records: &[Record], today: NaiveDate) -> Normalized {
    let mut normalized = Normalized::default();

    for record in records {
        match normalize_one(record, today) {
            Ok(observation) => normalized.observations.push(observation),
            Err(why) => normalized.rejected.push(why),
        }
    }

    normalized
}

fn normalize_one(record: &Record, today: NaiveDate) -> Result<Observation, ValidationError> {
    let reject = |reason: String| ValidationError::new(record.series, record.as_of.as_str(), reason);

    let date = datetime::parse_date(&record.as_of).map_err(|why| reject(why.to_string()))?;
    if date > today {
        return Err(reject(format!("date {} is after today {}", date, today)));
    }

    let value = text::parse_decimal(&record.value, None)
        .map_err(|_| reject(format!("value '{}' is not a number", record.value)))?;

    let value = to_series_unit(value, record.unit, record.series.unit()).ok_or_else(|| {
        reject(format!(
            "unit {} does not match {} of {}",
            record.unit,
            record.series.unit(),
            record.series
        ))
    })?;

    Ok(Observation::new(record.series, date, value.normalize()))
}

/// 基點轉百分比，其他不一致的單位視為錯誤
fn to_series_unit(value: Decimal, from: Unit, to: Unit) -> Option<Decimal> {
    match (from, to) {
        (from, to) if from == to => Some(value),
        (Unit::BasisPoints, Unit::Percent) => Some(value / dec!(100)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::declare::Series;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_normalize() {
        let records = vec![
            Record::percent(Series::Sofr, "2024-01-02", "5.40"),
            Record::percent(Series::Ust10Y, "01/02/2024", "3.95"),
            Record::new(Series::FedWatchNext, "2024-01-02", "438.7", Unit::BasisPoints),
            Record::percent(Series::Hibor1M, "2024-01-02T11:15:00", "4.68810"),
        ];

        let normalized = normalize(&records, ymd(2024, 1, 2));
        assert!(normalized.rejected.is_empty());
        assert_eq!(
            normalized.observations,
            vec![
                Observation::new(Series::Sofr, ymd(2024, 1, 2), dec!(5.4)),
                Observation::new(Series::Ust10Y, ymd(2024, 1, 2), dec!(3.95)),
                Observation::new(Series::FedWatchNext, ymd(2024, 1, 2), dec!(4.387)),
                Observation::new(Series::Hibor1M, ymd(2024, 1, 2), dec!(4.6881)),
            ]
        );
    }

    #[test]
    fn test_normalize_rejects() {
        let records = vec![
            Record::percent(Series::Sofr, "2024-01-03", "5.40"),
            Record::percent(Series::Sofr, "someday", "5.40"),
            Record::percent(Series::Sofr, "2024-01-02", "N/A"),
            Record::percent(Series::Sofr, "2024-01-01", "5.31"),
        ];

        let normalized = normalize(&records, ymd(2024, 1, 2));
        assert_eq!(normalized.observations.len(), 1);
        assert_eq!(normalized.rejected.len(), 3);
        assert!(normalized.rejected[0].reason.contains("after today"));
        assert_eq!(normalized.rejected[2].date, "2024-01-02");
    }

    #[test]
    fn test_to_series_unit() {
        assert_eq!(
            to_series_unit(dec!(525), Unit::BasisPoints, Unit::Percent),
            Some(dec!(5.25))
        );
        assert_eq!(to_series_unit(dec!(5.25), Unit::Percent, Unit::BasisPoints), None);
    }
}

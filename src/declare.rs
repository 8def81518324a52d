use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// 資料來源
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, AsRefStr, EnumIter,
)]
pub enum Source {
    /// 香港銀行公會 HIBOR 定價
    #[strum(to_string = "hkab")]
    Hkab,
    /// 匯豐、星展的最優惠利率 (P)
    #[strum(to_string = "bank_prime")]
    BankPrime,
    /// Interactive Brokers 融資利率
    #[strum(to_string = "ib")]
    InteractiveBrokers,
    /// St. Louis Fed FRED
    #[strum(to_string = "fred")]
    Fred,
    /// New York Fed
    #[strum(to_string = "nyfed")]
    NyFed,
    /// U.S. Department of the Treasury
    #[strum(to_string = "treasury")]
    Treasury,
    /// CME FedWatch
    #[strum(to_string = "fedwatch")]
    FedWatch,
    /// 金管局港元遠期匯率 (隱含利率)
    #[strum(to_string = "hkma")]
    Hkma,
    /// 星展 e$aver 存款推廣 (現有客戶條款 PDF)
    #[strum(to_string = "esaver")]
    DbsEsaver,
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::Hkab => "HKAB",
            Source::BankPrime => "HSBC / DBS",
            Source::InteractiveBrokers => "Interactive Brokers",
            Source::Fred => "FRED",
            Source::NyFed => "NY Fed",
            Source::Treasury => "US Treasury",
            Source::FedWatch => "CME FedWatch",
            Source::Hkma => "HKMA",
            Source::DbsEsaver => "DBS eSaver",
        }
    }

    /// 這個來源負責的所有序列
    pub fn series(&self) -> Vec<Series> {
        Series::iter().filter(|s| s.source() == *self).collect()
    }
}

/// 數值單位
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display)]
pub enum Unit {
    #[strum(to_string = "%")]
    Percent,
    #[strum(to_string = "bp")]
    BasisPoints,
    /// 遠期點數
    #[strum(to_string = "pips")]
    Pips,
}

impl Unit {
    /// 報表數值後面接的符號
    pub fn suffix(&self) -> &'static str {
        match self {
            Unit::Percent => "%",
            Unit::BasisPoints => "bp",
            Unit::Pips => " pips",
        }
    }
}

/// 報表中的區塊
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
pub enum Section {
    Hkd,
    Usd,
    Treasury,
    Outlook,
    HkdForwards,
    Savings,
}

impl Section {
    pub fn title(&self) -> &'static str {
        match self {
            Section::Hkd => "HKD Interest Rates",
            Section::Usd => "USD Interest Rates",
            Section::Treasury => "US Treasury Yield Curve",
            Section::Outlook => "Market Rate Expectations",
            Section::HkdForwards => "HKD Forward Points (Implied Future Rates)",
            Section::Savings => "DBS eSaver Promotion (Existing Customers)",
        }
    }

    pub fn series(&self) -> impl Iterator<Item = Series> + '_ {
        Series::iter().filter(move |s| s.section() == *self)
    }
}

/// 追蹤中的利率序列，建立後不再變動
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
pub enum Series {
    #[strum(to_string = "HIBOR_ON")]
    HiborOvernight,
    #[strum(to_string = "HIBOR_1M")]
    Hibor1M,
    #[strum(to_string = "HIBOR_3M")]
    Hibor3M,
    #[strum(to_string = "HIBOR_12M")]
    Hibor12M,
    #[strum(to_string = "PRIME_HSBC")]
    PrimeHsbc,
    #[strum(to_string = "PRIME_DBS")]
    PrimeDbs,
    #[strum(to_string = "IB_MARGIN_HKD")]
    IbMarginHkd,
    #[strum(to_string = "IB_MARGIN_USD")]
    IbMarginUsd,
    #[strum(to_string = "FED_FUNDS_EFFECTIVE")]
    FedFundsEffective,
    #[strum(to_string = "FED_FUNDS_TARGET_UPPER")]
    FedFundsTargetUpper,
    #[strum(to_string = "FED_FUNDS_TARGET_LOWER")]
    FedFundsTargetLower,
    #[strum(to_string = "SOFR")]
    Sofr,
    #[strum(to_string = "UST_1M")]
    Ust1M,
    #[strum(to_string = "UST_2M")]
    Ust2M,
    #[strum(to_string = "UST_3M")]
    Ust3M,
    #[strum(to_string = "UST_6M")]
    Ust6M,
    #[strum(to_string = "UST_1Y")]
    Ust1Y,
    #[strum(to_string = "UST_2Y")]
    Ust2Y,
    #[strum(to_string = "UST_3Y")]
    Ust3Y,
    #[strum(to_string = "UST_5Y")]
    Ust5Y,
    #[strum(to_string = "UST_7Y")]
    Ust7Y,
    #[strum(to_string = "UST_10Y")]
    Ust10Y,
    #[strum(to_string = "UST_20Y")]
    Ust20Y,
    #[strum(to_string = "UST_30Y")]
    Ust30Y,
    #[strum(to_string = "FEDWATCH_NEXT")]
    FedWatchNext,
    #[strum(to_string = "FEDWATCH_FAR")]
    FedWatchFar,
    #[strum(to_string = "HKD_FWD_1M")]
    HkdForward1M,
    #[strum(to_string = "HKD_FWD_3M")]
    HkdForward3M,
    #[strum(to_string = "HKD_FWD_6M")]
    HkdForward6M,
    #[strum(to_string = "HKD_FWD_12M")]
    HkdForward12M,
    /// 以推廣月份的第一天為日期
    #[strum(to_string = "ESAVER_HKD")]
    EsaverHkd,
    #[strum(to_string = "ESAVER_USD")]
    EsaverUsd,
}

/// 利率合理範圍的上限
const RATE_CEILING: Decimal = dec!(25);

/// 遠期點數可以是負數，範圍另外設定
const POINTS_LIMIT: Decimal = dec!(5000);

/// 每月一筆的序列，過期門檻至少這麼多天
const MONTHLY_STALE_DAYS: i64 = 45;

impl Series {
    /// 序列代號，同時也是儲存檔名
    pub fn id(&self) -> &'static str {
        (*self).into()
    }

    pub fn unit(&self) -> Unit {
        match self.source() {
            Source::Hkma => Unit::Pips,
            _ => Unit::Percent,
        }
    }

    /// 合理範圍的下限，利率不可為負
    pub fn floor(&self) -> Decimal {
        match self.unit() {
            Unit::Pips => -POINTS_LIMIT,
            _ => Decimal::ZERO,
        }
    }

    pub fn ceiling(&self) -> Decimal {
        match self.unit() {
            Unit::Pips => POINTS_LIMIT,
            _ => RATE_CEILING,
        }
    }

    /// 超過幾天沒有新資料算過期，月資料不會每天更新
    pub fn stale_after(&self, days: i64) -> i64 {
        match self.source() {
            Source::DbsEsaver => days.max(MONTHLY_STALE_DAYS),
            _ => days,
        }
    }

    pub fn source(&self) -> Source {
        match self {
            Series::HiborOvernight | Series::Hibor1M | Series::Hibor3M | Series::Hibor12M => {
                Source::Hkab
            }
            Series::PrimeHsbc | Series::PrimeDbs => Source::BankPrime,
            Series::IbMarginHkd | Series::IbMarginUsd => Source::InteractiveBrokers,
            Series::FedFundsEffective | Series::FedFundsTargetUpper | Series::FedFundsTargetLower => {
                Source::Fred
            }
            Series::Sofr => Source::NyFed,
            Series::Ust1M
            | Series::Ust2M
            | Series::Ust3M
            | Series::Ust6M
            | Series::Ust1Y
            | Series::Ust2Y
            | Series::Ust3Y
            | Series::Ust5Y
            | Series::Ust7Y
            | Series::Ust10Y
            | Series::Ust20Y
            | Series::Ust30Y => Source::Treasury,
            Series::FedWatchNext | Series::FedWatchFar => Source::FedWatch,
            Series::HkdForward1M
            | Series::HkdForward3M
            | Series::HkdForward6M
            | Series::HkdForward12M => Source::Hkma,
            Series::EsaverHkd | Series::EsaverUsd => Source::DbsEsaver,
        }
    }

    pub fn section(&self) -> Section {
        match self.source() {
            Source::Hkab | Source::BankPrime => Section::Hkd,
            Source::InteractiveBrokers => match self {
                Series::IbMarginHkd => Section::Hkd,
                _ => Section::Usd,
            },
            Source::Fred | Source::NyFed => Section::Usd,
            Source::Treasury => Section::Treasury,
            Source::FedWatch => Section::Outlook,
            Source::Hkma => Section::HkdForwards,
            Source::DbsEsaver => Section::Savings,
        }
    }

    /// 報表上顯示的名稱
    pub fn name(&self) -> &'static str {
        match self {
            Series::HiborOvernight => "HIBOR Overnight",
            Series::Hibor1M => "HIBOR 1 Month",
            Series::Hibor3M => "HIBOR 3 Months",
            Series::Hibor12M => "HIBOR 12 Months",
            Series::PrimeHsbc => "Prime Rate (HSBC)",
            Series::PrimeDbs => "Prime Rate (DBS)",
            Series::IbMarginHkd => "IB HKD Margin Rate",
            Series::IbMarginUsd => "IB USD Margin Rate",
            Series::FedFundsEffective => "Fed Funds Effective",
            Series::FedFundsTargetUpper => "Fed Funds Target Upper",
            Series::FedFundsTargetLower => "Fed Funds Target Lower",
            Series::Sofr => "SOFR",
            Series::Ust1M => "1 Mo",
            Series::Ust2M => "2 Mo",
            Series::Ust3M => "3 Mo",
            Series::Ust6M => "6 Mo",
            Series::Ust1Y => "1 Yr",
            Series::Ust2Y => "2 Yr",
            Series::Ust3Y => "3 Yr",
            Series::Ust5Y => "5 Yr",
            Series::Ust7Y => "7 Yr",
            Series::Ust10Y => "10 Yr",
            Series::Ust20Y => "20 Yr",
            Series::Ust30Y => "30 Yr",
            Series::FedWatchNext => "Implied Fed Funds (next FOMC)",
            Series::FedWatchFar => "Implied Fed Funds (farthest FOMC)",
            Series::HkdForward1M => "HKD Forward 1 Month",
            Series::HkdForward3M => "HKD Forward 3 Months",
            Series::HkdForward6M => "HKD Forward 6 Months",
            Series::HkdForward12M => "HKD Forward 12 Months",
            Series::EsaverHkd => "e$aver HKD Promo Rate",
            Series::EsaverUsd => "e$aver USD Promo Rate",
        }
    }

    /// 美債殖利率曲線的期別，依到期日排序
    pub fn treasury_curve() -> [Series; 12] {
        [
            Series::Ust1M,
            Series::Ust2M,
            Series::Ust3M,
            Series::Ust6M,
            Series::Ust1Y,
            Series::Ust2Y,
            Series::Ust3Y,
            Series::Ust5Y,
            Series::Ust7Y,
            Series::Ust10Y,
            Series::Ust20Y,
            Series::Ust30Y,
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_series_id_round_trip() {
        for s in Series::iter() {
            assert_eq!(Series::from_str(s.id()).unwrap(), s);
            assert_eq!(s.id(), s.to_string());
        }
        assert_eq!(Series::Hibor1M.to_string(), "HIBOR_1M");
        assert_eq!(Series::HkdForward12M.id(), "HKD_FWD_12M");
    }

    #[test]
    fn test_every_source_owns_series() {
        for source in Source::iter() {
            assert!(!source.series().is_empty(), "{} has no series", source);
        }
        assert_eq!(Source::Treasury.series().len(), 12);
        assert_eq!(Source::from_str("ib").unwrap(), Source::InteractiveBrokers);
    }

    #[test]
    fn test_sections() {
        assert_eq!(Series::IbMarginHkd.section(), Section::Hkd);
        assert_eq!(Series::IbMarginUsd.section(), Section::Usd);
        assert_eq!(Section::Treasury.series().count(), 12);
        assert_eq!(Section::HkdForwards.series().count(), 4);
        assert_eq!(Series::EsaverUsd.section(), Section::Savings);
    }

    #[test]
    fn test_forward_points_may_be_negative() {
        assert_eq!(Series::HkdForward3M.unit(), Unit::Pips);
        assert!(Series::HkdForward3M.floor().is_sign_negative());
        assert_eq!(Series::Sofr.floor(), Decimal::ZERO);
        assert_eq!(Series::Sofr.ceiling(), dec!(25));
    }

    #[test]
    fn test_stale_after() {
        assert_eq!(Series::Sofr.stale_after(3), 3);
        assert_eq!(Series::EsaverHkd.stale_after(3), 45);
        assert_eq!(Series::EsaverHkd.stale_after(60), 60);
    }
}

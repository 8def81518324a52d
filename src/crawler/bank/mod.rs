use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{
    crawler::{Batch, DateWindow, Fetcher, Record},
    declare::{Series, Source},
    error::FetchError,
    logging,
};

/// 星展銀行 (大P)
pub mod dbs;
/// 匯豐銀行 (細P)
pub mod hsbc;

/// 最優惠利率的合理範圍
const PRIME_FLOOR: Decimal = dec!(3.0);
const PRIME_CEILING: Decimal = dec!(10.0);

pub(super) fn is_plausible_prime(rate: Decimal) -> bool {
    (PRIME_FLOOR..=PRIME_CEILING).contains(&rate)
}

/// 網頁只有當下的利率，所以沒有歷史資料
pub struct BankPrime;

#[async_trait]
impl Fetcher for BankPrime {
    fn source(&self) -> Source {
        Source::BankPrime
    }

    async fn fetch(&self, window: &DateWindow) -> Result<Batch, FetchError> {
        let as_of = window.to.format("%Y-%m-%d").to_string();
        let (hsbc, dbs) = tokio::join!(hsbc::visit(), dbs::visit());

        collect(as_of.as_str(), [(Series::PrimeHsbc, hsbc), (Series::PrimeDbs, dbs)])
            .into_result(self.source())
    }
}

/// 失敗的那家銀行單獨回報，成功的照常寫入
fn collect<const N: usize>(as_of: &str, results: [(Series, Result<Decimal>); N]) -> Batch {
    let mut batch = Batch::default();

    for (series, result) in results {
        match result {
            Ok(rate) => batch
                .records
                .push(Record::percent(series, as_of, rate.to_string())),
            Err(why) => {
                logging::error_file_async(format!("Failed to get {} because {:?}", series, why));
                batch.push_failure(FetchError::for_series(series, format!("{:#}", why)));
            }
        }
    }

    batch
}

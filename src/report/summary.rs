use std::fmt::Write;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{
    declare::Series,
    report::{
        html::{escape, format_rate},
        Report,
    },
};

/// 匯豐 WPL 按揭 (一個月內) = HIBOR 1M + 1.2%
const HSBC_WPL_SPREAD: Decimal = dec!(1.2);

impl Report {
    fn current(&self, series: Series) -> Option<Decimal> {
        self.row(series).and_then(|row| row.current())
    }
}

fn push_rate(msg: &mut String, report: &Report, icon: &str, label: &str, series: Series) {
    if let Some(value) = report.current(series) {
        let _ = writeln!(msg, "{} {}: <b>{}</b>", icon, label, format_rate(series, value));
    }
}

/// Telegram 訊息 (HTML parse mode)
pub fn render(report: &Report) -> String {
    let mut msg = String::with_capacity(2048);

    let _ = writeln!(
        msg,
        "📊 <b>Interest Rate Monitor</b> {}\n",
        report.date.format("%Y-%m-%d")
    );

    push_rate(&mut msg, report, "🇭🇰", "HIBOR 1M", Series::Hibor1M);
    push_rate(&mut msg, report, "🇭🇰", "HIBOR 3M", Series::Hibor3M);
    if let Some(h1m) = report.current(Series::Hibor1M) {
        let _ = writeln!(
            msg,
            "🏠 HSBC WPL (&lt;1m): <b>{:.4}%</b>",
            h1m + HSBC_WPL_SPREAD
        );
    }
    push_rate(&mut msg, report, "🏦", "HSBC Prime", Series::PrimeHsbc);
    push_rate(&mut msg, report, "🏦", "DBS Prime", Series::PrimeDbs);
    msg.push('\n');

    if let (Some(lower), Some(upper)) = (
        report.current(Series::FedFundsTargetLower),
        report.current(Series::FedFundsTargetUpper),
    ) {
        let _ = writeln!(msg, "🇺🇸 Fed Target: <b>{:.2}%-{:.2}%</b>", lower, upper);
    }
    push_rate(&mut msg, report, "🇺🇸", "Fed Effective", Series::FedFundsEffective);
    push_rate(&mut msg, report, "🇺🇸", "SOFR", Series::Sofr);
    push_rate(&mut msg, report, "🏛", "UST 10Y", Series::Ust10Y);
    push_rate(&mut msg, report, "💹", "IB HKD Margin", Series::IbMarginHkd);
    push_rate(&mut msg, report, "💹", "IB USD Margin", Series::IbMarginUsd);
    push_rate(&mut msg, report, "🔮", "FedWatch next FOMC", Series::FedWatchNext);
    push_rate(&mut msg, report, "🔭", "HKD Fwd 12M", Series::HkdForward12M);
    push_rate(&mut msg, report, "💰", "DBS e$aver HKD", Series::EsaverHkd);
    push_rate(&mut msg, report, "💰", "DBS e$aver USD", Series::EsaverUsd);

    if !report.failed_sources.is_empty() {
        let mut names: Vec<&str> = report.failed_sources.iter().map(|f| f.label()).collect();
        names.dedup();
        let _ = writeln!(msg, "\n⚠️ Unavailable: {}", escape(&names.join(", ")));
    }

    if !report.stale.is_empty() {
        let _ = writeln!(msg, "\n⏳ Stale:");
        for stale in &report.stale {
            let _ = writeln!(msg, "• {}", escape(&stale.describe()));
        }
    }

    let _ = write!(msg, "\n<i>Full HTML report attached.</i>");

    msg
}

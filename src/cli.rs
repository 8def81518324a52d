use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::declare::Source;

/// HKD / USD 利率監控
#[derive(Debug, Parser)]
#[command(name = "rate_monitor", version, about = "Collects HKD and USD interest rates and reports them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 每日抓取並發送報表
    Daily {
        #[command(subcommand)]
        action: DailyAction,
    },
    /// 回補歷史資料
    Backfill {
        #[command(subcommand)]
        action: BackfillAction,
    },
    /// Print row count, date span and stale series of every table
    Status,
}

#[derive(Debug, Subcommand)]
pub enum DailyAction {
    /// Fetch today's rates, update history, render and send the report
    Run {
        /// Write the report without sending it
        #[arg(long)]
        no_notify: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum BackfillAction {
    /// Fetch a date range from every source that serves history
    Run(BackfillArgs),
}

#[derive(Debug, Args)]
pub struct BackfillArgs {
    /// First date, YYYY-MM-DD
    #[arg(long)]
    pub from: NaiveDate,

    /// Last date (inclusive), YYYY-MM-DD
    #[arg(long)]
    pub to: NaiveDate,

    /// Only these sources (hkab, bank_prime, ib, fred, nyfed, treasury, fedwatch)
    #[arg(long = "source")]
    pub sources: Vec<Source>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_daily_run() {
        let cli = Cli::try_parse_from(["rate_monitor", "daily", "run", "--no-notify"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Daily {
                action: DailyAction::Run { no_notify: true }
            }
        ));
    }

    #[test]
    fn test_backfill_run() {
        let cli = Cli::try_parse_from([
            "rate_monitor",
            "backfill",
            "run",
            "--from",
            "2024-01-01",
            "--to",
            "2024-01-31",
            "--source",
            "hkab",
            "--source",
            "nyfed",
        ])
        .unwrap();

        match cli.command {
            Command::Backfill {
                action: BackfillAction::Run(args),
            } => {
                assert_eq!(args.from, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
                assert_eq!(args.sources, vec![Source::Hkab, Source::NyFed]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let result = Cli::try_parse_from([
            "rate_monitor",
            "backfill",
            "run",
            "--from",
            "2024-01-01",
            "--to",
            "2024-01-31",
            "--source",
            "bloomberg",
        ]);
        assert!(result.is_err());
    }
}

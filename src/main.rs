#[cfg(all(target_os = "linux", target_env = "musl"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::process::ExitCode;

use clap::Parser;

use crate::{
    bot::{telegram::Telegram, Notifier},
    cli::{BackfillAction, Cli, Command, DailyAction},
    crawler::{DateWindow, Fetcher},
    error::RunError,
    ingest::RunSummary,
};

pub mod backfill;
pub mod bot;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod declare;
pub mod error;
pub mod event;
pub mod health;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod report;
pub mod storage;
pub mod util;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(why) => {
            logging::error_file_async(format!("Failed to run because {:?}", why));
            logging::error_console(why.to_string());
            why.exit_code()
        }
    };

    util::http::flush_log();
    logging::flush();

    ExitCode::from(code)
}

async fn run(cli: Cli) -> Result<u8, RunError> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        logging::warn_file_async("rustls crypto provider was already installed");
    }

    let app = config::App::load().map_err(|why| RunError::Config(format!("{:#}", why)))?;
    util::http::init(app.http.timeout());
    let today = util::datetime::today();

    match cli.command {
        Command::Daily {
            action: DailyAction::Run { no_notify },
        } => {
            let registry = crawler::registry(&app);
            let fetchers: Vec<&dyn Fetcher> = registry.iter().map(|f| f.as_ref()).collect();
            let telegram = if no_notify {
                None
            } else {
                match Telegram::new(&app.bot.telegram) {
                    Ok(telegram) => Some(telegram),
                    Err(why) => {
                        logging::warn_file_async(format!("Report will not be sent: {}", why));
                        logging::error_console(why.to_string());
                        None
                    }
                }
            };
            let notifier = telegram.as_ref().map(|t| t as &dyn Notifier);

            let summary = event::daily::execute(&app, &fetchers, notifier, today).await?;
            Ok(finish("daily", &summary))
        }
        Command::Backfill {
            action: BackfillAction::Run(args),
        } => {
            let window = DateWindow::new(args.from, args.to)?;
            let registry = crawler::registry(&app);
            let fetchers: Vec<&dyn Fetcher> = registry.iter().map(|f| f.as_ref()).collect();

            let summary = backfill::execute(&app, &fetchers, window, &args.sources).await?;
            Ok(finish("backfill", &summary))
        }
        Command::Status => {
            println!("{}", event::status::execute(&app, today)?);
            Ok(0)
        }
    }
}

fn finish(mode: &str, summary: &RunSummary) -> u8 {
    let text = summary.describe();
    logging::info_file_async(format!("{} finished\r\n{}", mode, text));
    println!("{}", text);

    let code = summary.exit_code();
    if code != 0 {
        logging::error_console(format!(
            "{} finished with {} failed sources and {} rejected observations",
            mode,
            summary.failed.len(),
            summary.rejected.len()
        ));
    }

    code
}

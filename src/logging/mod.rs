use std::{fmt::Write as _, thread, time::Duration};

use chrono::{format::DelayedFormat, DateTime, Local};
use crossbeam_channel::{bounded, unbounded, Sender};
use once_cell::sync::Lazy;

use crate::logging::rotate::Rotate;

pub mod rotate;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("default"));

/// 程式結束前等待背景線程寫完的上限
const FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

pub struct Logger {
    writer: Sender<Entry>,
}

enum Entry {
    Line(LogMessage),
    Flush(Sender<()>),
}

impl Logger {
    pub fn new(log_name: &str) -> Self {
        let (tx, rx) = unbounded::<Entry>();
        let fn_pattern = format!("log/%Y-%m-%d-{}.log", log_name);

        // 寫入檔案的操作使用另一個線程處理
        thread::spawn(move || {
            let mut rotate = Rotate::new(fn_pattern);
            let mut lines = String::with_capacity(4096);
            let mut last_at = Local::now();

            while let Ok(received) = rx.recv() {
                match received {
                    Entry::Line(msg) => {
                        last_at = msg.created_at;
                        if writeln!(
                            &mut lines,
                            "{} {} {}",
                            msg.created_at.format("%F %X%.6f"),
                            msg.level,
                            msg.msg
                        )
                        .is_err()
                        {
                            continue;
                        }

                        if rx.is_empty() || lines.len() >= 4096 {
                            write_lines(&mut rotate, last_at, &mut lines);
                        }
                    }
                    Entry::Flush(ack) => {
                        write_lines(&mut rotate, last_at, &mut lines);
                        rotate.flush();
                        let _ = ack.send(());
                    }
                }
            }
        });

        Logger { writer: tx }
    }

    pub fn info(&self, log: impl Into<String>) {
        self.send(log::Level::Info, log.into());
    }

    pub fn warn(&self, log: impl Into<String>) {
        self.send(log::Level::Warn, log.into());
    }

    pub fn error(&self, log: impl Into<String>) {
        self.send(log::Level::Error, log.into());
    }

    pub fn debug(&self, log: impl Into<String>) {
        self.send(log::Level::Debug, log.into());
    }

    /// 等待佇列中的訊息全部寫入檔案
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = bounded::<()>(1);
        if self.writer.send(Entry::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv_timeout(FLUSH_TIMEOUT);
        }
    }

    fn send(&self, level: log::Level, msg: String) {
        if let Err(why) = self.writer.send(Entry::Line(LogMessage::new(level, msg))) {
            error_console(why.to_string());
        }
    }
}

fn write_lines(rotate: &mut Rotate, now: DateTime<Local>, lines: &mut String) {
    if lines.is_empty() {
        return;
    }

    if let Err(why) = rotate.write_msg(now, lines.as_bytes()) {
        error_console(format!("Failed to write log because {:?}", why));
        info_console(lines.clone());
    }

    lines.clear();
}

pub struct LogMessage {
    pub level: log::Level,
    pub msg: String,
    pub created_at: DateTime<Local>,
}

impl LogMessage {
    pub fn new(level: log::Level, msg: String) -> Self {
        LogMessage {
            level,
            msg,
            created_at: Local::now(),
        }
    }
}

pub fn info_file_async(log: impl Into<String>) {
    LOGGER.info(log);
}

pub fn warn_file_async(log: impl Into<String>) {
    LOGGER.warn(log);
}

pub fn error_file_async(log: impl Into<String>) {
    LOGGER.error(log);
}

pub fn debug_file_async(log: impl Into<String>) {
    LOGGER.debug(log);
}

/// 程式結束前呼叫，避免遺失尚未寫入的訊息
pub fn flush() {
    LOGGER.flush();
}

pub fn info_console(log: impl AsRef<str>) {
    println!(
        "{} Info {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log.as_ref()
    );
}

pub fn error_console(log: impl AsRef<str>) {
    eprintln!(
        "{} Error {}",
        DelayedFormat::to_string(&Local::now().format("%Y-%m-%d %H:%M:%S.%3f")),
        log.as_ref()
    );
}

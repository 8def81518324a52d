use std::future::Future;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::{
    bot::Notifier, config, error::DeliveryError, logging, report::Document, util::http,
};

const API_URL: &str = "https://api.telegram.org";

/// sendMessage 單則訊息的長度上限
const MESSAGE_LIMIT: usize = 4096;
/// sendDocument caption 的長度上限
const CAPTION_LIMIT: usize = 1024;

pub struct Telegram {
    token: String,
    chat_ids: Vec<i64>,
}

impl Telegram {
    /// token 或 chat id 沒有設定時回傳 NotConfigured
    pub fn new(config: &config::Telegram) -> Result<Self, DeliveryError> {
        if !config.is_configured() {
            return Err(DeliveryError::NotConfigured);
        }

        let mut chat_ids: Vec<i64> = config.allowed.keys().copied().collect();
        chat_ids.sort_unstable();

        Ok(Self {
            token: config.token.clone(),
            chat_ids,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_URL, self.token, method)
    }

    async fn send_message(&self, payload: &SendMessageRequest<'_>) -> Result<()> {
        let res = http::post_use_json::<SendMessageRequest, TelegramResponse>(
            &self.url("sendMessage"),
            None,
            Some(payload),
        )
        .await
        .map_err(|err| anyhow!("Failed to send_message because: {:?}", err))?;

        res.into_result()
    }

    async fn send_document(&self, chat_id: i64, document: &Document) -> Result<()> {
        let part = Part::bytes(document.html.clone().into_bytes())
            .file_name(document.file_name.clone())
            .mime_str("text/html")
            .map_err(|err| anyhow!("Failed to build the document part because: {:?}", err))?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", truncate(&document.caption, CAPTION_LIMIT))
            .text("parse_mode", "HTML")
            .part("document", part);

        let res = http::post_multipart::<TelegramResponse>(&self.url("sendDocument"), form)
            .await
            .map_err(|err| anyhow!("Failed to send_document because: {:?}", err))?;

        res.into_result()
    }

    /// 依序送出多段訊息，任一段失敗就停止
    async fn send_chunks(&self, chat_id: i64, chunks: &[String]) -> Result<()> {
        for chunk in chunks {
            self.send_message(&SendMessageRequest::new(chat_id, chunk))
                .await?;
        }

        Ok(())
    }

    /// 對每個 chat 執行 `task`，回傳第一個失敗
    async fn to_every_chat<F, Fut>(&self, task: F) -> Result<(), DeliveryError>
    where
        F: Fn(i64) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let futures = self.chat_ids.iter().map(|id| {
            let fut = task(*id);
            async move { (*id, fut.await) }
        });

        let mut first_failure = None;
        for (chat_id, result) in join_all(futures).await {
            if let Err(why) = result {
                logging::error_file_async(format!(
                    "Failed to deliver to telegram chat {} because {:?}",
                    chat_id, why
                ));
                if first_failure.is_none() {
                    first_failure = Some(DeliveryError::Failed {
                        target: format!("telegram:{}", chat_id),
                        reason: format!("{:#}", why),
                    });
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Notifier for Telegram {
    async fn alert(&self, text: &str) -> Result<(), DeliveryError> {
        let chunks = split_message(text, MESSAGE_LIMIT);
        self.to_every_chat(|chat_id| {
            let chunks = &chunks;
            async move { self.send_chunks(chat_id, chunks).await }
        })
        .await
    }

    async fn send(&self, document: &Document) -> Result<(), DeliveryError> {
        let chunks = split_message(&document.summary, MESSAGE_LIMIT);
        self.to_every_chat(|chat_id| {
            let chunks = &chunks;
            async move {
                self.send_chunks(chat_id, chunks).await?;
                self.send_document(chat_id, document).await
            }
        })
        .await
    }
}

#[derive(Deserialize, Debug)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramResponse {
    fn into_result(self) -> Result<()> {
        if self.ok {
            return Ok(());
        }

        Err(anyhow!(
            "Telegram API returned not ok: {}",
            self.description.unwrap_or_default()
        ))
    }
}

#[derive(Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    pub parse_mode: &'static str,
    pub disable_web_page_preview: bool,
}

impl<'a> SendMessageRequest<'a> {
    pub fn new(chat_id: i64, text: &'a str) -> SendMessageRequest<'a> {
        SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        }
    }
}

/// 依行切割成不超過 `limit` 個字元的訊息，單行過長時直接截斷成多段
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() {
            line_len
        } else {
            current_len + 1 + line_len
        };

        if needed <= limit {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len = needed;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        let chars: Vec<char> = line.chars().collect();
        let mut pieces = chars.chunks(limit).map(|c| c.iter().collect::<String>()).peekable();
        while let Some(piece) = pieces.next() {
            if pieces.peek().is_some() {
                chunks.push(piece);
            } else {
                current_len = piece.chars().count();
                current = piece;
            }
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

/// 超過上限時截斷並以 … 結尾
fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let mut truncated: String = text.chars().take(limit.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

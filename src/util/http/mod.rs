use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use reqwest::{header, multipart::Form, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Semaphore;

use crate::logging::Logger;

pub mod element;
pub mod user_agent;

/// 限制最多 5 個並發請求，避免被目標網站封禁。
static SEMAPHORE: Lazy<Semaphore> = Lazy::new(|| Semaphore::new(5));

/// A singleton instance of the reqwest client.
static CLIENT: OnceCell<Client> = OnceCell::new();

/// 由設定檔決定的單次請求逾時，需在第一次請求前設定
static TIMEOUT: OnceCell<Duration> = OnceCell::new();

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("http"));

/// 遮蔽 Telegram bot token
static BOT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/bot[^/]+/").expect("Failed to compile bot token regex"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// 每次請求後的延遲
const REQUEST_DELAY: Duration = Duration::from_millis(300);

/// Sets the per-request timeout. Later calls are ignored once the client exists.
pub fn init(timeout: Duration) {
    if TIMEOUT.set(timeout).is_err() {
        LOGGER.warn(format!("http timeout already set, ignore {:?}", timeout));
    }
}

/// 程式結束前將 http log 寫入檔案
pub fn flush_log() {
    LOGGER.flush();
}

fn get_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        let timeout = TIMEOUT.get().copied().unwrap_or(DEFAULT_TIMEOUT);
        Client::builder()
            // ===== 壓縮 =====
            .brotli(true)
            .deflate(true)
            .gzip(true)
            .zstd(true)
            // ===== 超時設置 =====
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            // ===== TCP 優化 =====
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            // ===== HTTP/2 =====
            .http2_keep_alive_interval(Duration::from_secs(30))
            .http2_keep_alive_timeout(Duration::from_secs(10))
            .http2_keep_alive_while_idle(true)
            // ===== 連接池 =====
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            // ===== Cookie 和重定向 =====
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            // ===== Headers =====
            .referer(true)
            .user_agent(user_agent::gen_random_ua())
            .build()
            .map_err(|e| anyhow!("Failed to create reqwest client: {:?}", e))
    })
}

/// Performs an HTTP GET request and returns the response as text.
pub async fn get(url: &str, headers: Option<header::HeaderMap>) -> Result<String> {
    send(Method::GET, url, headers, None::<fn(_) -> _>)
        .await?
        .text()
        .await
        .map_err(|e| anyhow!("Error parsing response text: {:?}", e))
}

/// Performs an HTTP GET request and returns the raw body (PDF and other binary documents).
pub async fn get_bytes(url: &str) -> Result<Vec<u8>> {
    send(Method::GET, url, None, None::<fn(_) -> _>)
        .await?
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|e| anyhow!("Error reading response bytes: {:?}", e))
}

/// Performs an HTTP GET request with url-encoded query parameters.
pub async fn get_with_query<Q>(url: &str, query: &Q) -> Result<String>
where
    Q: Serialize + ?Sized,
{
    send(
        Method::GET,
        url,
        None,
        Some(|rb: RequestBuilder| rb.query(query)),
    )
    .await?
    .text()
    .await
    .map_err(|e| anyhow!("Error parsing response text: {:?}", e))
}

/// Performs an HTTP GET request and deserializes the JSON response into `RES`.
pub async fn get_json<RES: DeserializeOwned>(url: &str) -> Result<RES> {
    parse_json(&get(url, None).await?)
}

pub async fn get_json_with_query<Q, RES>(url: &str, query: &Q) -> Result<RES>
where
    Q: Serialize + ?Sized,
    RES: DeserializeOwned,
{
    parse_json(&get_with_query(url, query).await?)
}

/// Performs an HTTP POST request with JSON request and response.
pub async fn post_use_json<REQ, RES>(
    url: &str,
    headers: Option<header::HeaderMap>,
    req: Option<&REQ>,
) -> Result<RES>
where
    REQ: Serialize,
    RES: DeserializeOwned,
{
    let res = send(
        Method::POST,
        url,
        headers,
        Some(|rb: RequestBuilder| {
            if let Some(r) = req {
                rb.json(r)
            } else {
                rb
            }
        }),
    )
    .await?;

    let res_body = res
        .text()
        .await
        .map_err(|e| anyhow!("Error reading response body: {}", e))?;

    parse_json(&res_body)
}

/// Performs a multipart/form-data POST (file uploads) and parses the JSON response.
pub async fn post_multipart<RES: DeserializeOwned>(url: &str, form: Form) -> Result<RES> {
    let res_body = send(
        Method::POST,
        url,
        None,
        Some(|rb: RequestBuilder| rb.multipart(form)),
    )
    .await?
    .text()
    .await
    .map_err(|e| anyhow!("Error reading response body: {}", e))?;

    parse_json(&res_body)
}

fn parse_json<RES: DeserializeOwned>(body: &str) -> Result<RES> {
    serde_json::from_str(body).map_err(|e| {
        anyhow!(
            "Error parsing response JSON({}): {:?}",
            snippet(body, 200),
            e
        )
    })
}

/// Sends one request. There is no retry; a failure is reported to the caller as is.
///
/// Non-2xx responses are turned into errors carrying the status and the start of the body.
async fn send(
    method: Method,
    url: &str,
    headers: Option<header::HeaderMap>,
    body: Option<impl FnOnce(RequestBuilder) -> RequestBuilder>,
) -> Result<Response> {
    let visit_log = format!("{}:{}", method, redact(url));
    let client = get_client()?;
    let mut rb = client.request(method, url);

    if let Some(h) = headers {
        rb = rb.headers(h);
    }

    if let Some(body_fn) = body {
        rb = body_fn(rb);
    }

    let permit = SEMAPHORE.acquire().await;
    let start = Instant::now();
    let res = rb.send().await;
    let elapsed = start.elapsed().as_millis();

    // 請求延遲，避免被目標網站封禁
    tokio::time::sleep(REQUEST_DELAY).await;
    drop(permit);

    let response = match res {
        Ok(response) => response,
        Err(why) => {
            // reqwest 的錯誤訊息帶有完整網址，其中可能有 token 或 api key
            let why = why.without_url();
            LOGGER.error(format!("{} failed because {:?}. {} ms", visit_log, why, elapsed));
            return Err(anyhow!("Failed to send {} because {}", visit_log, why));
        }
    };

    let status = response.status();
    if status.is_success() {
        LOGGER.info(format!("{} {} {} ms", visit_log, status.as_u16(), elapsed));
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    LOGGER.error(format!("{} {} {} ms\r\n{}", visit_log, status, elapsed, text));

    Err(anyhow!(
        "{} responded with {}: {}",
        visit_log,
        status,
        snippet(&text, 200)
    ))
}

fn redact(url: &str) -> String {
    BOT_TOKEN.replace(url, "/bot***/").to_string()
}

fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

use async_trait::async_trait;

use crate::{error::DeliveryError, report::Document};

pub mod telegram;

/// 報表的發送管道
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 發送警告文字
    async fn alert(&self, text: &str) -> Result<(), DeliveryError>;

    /// 發送摘要與 HTML 報表
    async fn send(&self, document: &Document) -> Result<(), DeliveryError>;
}

/// 每日抓取、產生報表並通知
pub mod daily;
/// 顯示目前儲存的資料狀態
pub mod status;

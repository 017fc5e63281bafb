use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

use crate::config::SkinConfig;

/// 构建访问皮肤源站的 HTTP Client（统一连接池/Keep-Alive，进程内复用）。
///
/// 说明：
/// - 整体 timeout 覆盖 connect + 读取 body，超时统一按获取失败处理；
/// - 固定 User-Agent 便于源站识别调用方；
/// - 不开启任何重试，重试/回退策略由 `SkinCache` 决定。
pub fn build_origin_client(cfg: &SkinConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("image/png,image/*;q=0.8"));

    Client::builder()
        .user_agent(cfg.user_agent.clone())
        .default_headers(headers)
        .timeout(cfg.timeout_duration())
        .connect_timeout(cfg.timeout_duration())
        .build()
}

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::{Client, StatusCode};

use crate::config::SkinConfig;
use crate::error::SkinError;

/// 皮肤源站抽象：按玩家名取回原始皮肤字节。
///
/// 约定：源站上不存在的资源是正常的失败结果（`OriginNotFound`），不是异常；
/// 实现方不做任何重试，也不接触本地缓存。
#[async_trait]
pub trait SkinOrigin: Send + Sync {
    /// `name` 原样使用（保留大小写），源站区分大小写。
    async fn fetch(&self, name: &str) -> Result<Bytes, SkinError>;
}

/// 基于固定 URL 模板的 HTTP 源站客户端
#[derive(Clone)]
pub struct HttpSkinOrigin {
    client: Client,
    template: String,
}

impl HttpSkinOrigin {
    pub fn new(client: Client, template: impl Into<String>) -> Self {
        Self {
            client,
            template: template.into(),
        }
    }

    /// 按配置构建（User-Agent / timeout 见 `crate::http`）
    pub fn from_config(cfg: &SkinConfig) -> Result<Self, SkinError> {
        let client = crate::http::build_origin_client(cfg)
            .map_err(|e| SkinError::OriginUnreachable(format!("初始化 HTTP Client 失败: {e}")))?;
        Ok(Self::new(client, cfg.origin_template.clone()))
    }

    /// 将玩家名代入模板得到请求地址
    pub fn url_for(&self, name: &str) -> String {
        self.template.replace("{username}", name)
    }
}

#[async_trait]
impl SkinOrigin for HttpSkinOrigin {
    async fn fetch(&self, name: &str) -> Result<Bytes, SkinError> {
        let url = self.url_for(name);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(%url, "源站不存在该皮肤");
            return Err(SkinError::OriginNotFound);
        }
        if !status.is_success() {
            return Err(SkinError::OriginUnreachable(format!(
                "源站返回状态码 {status}"
            )));
        }

        let body = resp.bytes().await?;
        if body.is_empty() {
            return Err(SkinError::DecodeFailure("源站返回空内容".to_string()));
        }
        Ok(body)
    }
}

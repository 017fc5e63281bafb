use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型（HTTP 边界层使用）
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 资源不存在
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// 参数校验错误
    #[error("参数校验错误: {0}")]
    Validation(String),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 皮肤获取/缓存错误
    #[error("皮肤错误: {0}")]
    Skin(#[from] SkinError),
}

/// 皮肤缓存核心的错误类型。
///
/// 源站相关错误（不可达、404、超时、解码失败）都会在 `SkinCache` 内部被
/// “旧缓存 / 默认皮肤” 回退吸收；只有显式刷新或默认皮肤本身不可用时才会外抛。
#[derive(Error, Debug, Clone, PartialEq, Eq, utoipa::ToSchema)]
pub enum SkinError {
    /// 源站不可达（网络错误或非 2xx 状态码）
    #[error("源站不可达: {0}")]
    OriginUnreachable(String),

    /// 源站明确返回 404
    #[error("源站不存在该皮肤")]
    OriginNotFound,

    /// 源站请求超时
    #[error("源站请求超时")]
    Timeout,

    /// 返回内容不是合法的皮肤位图
    #[error("皮肤解码失败: {0}")]
    DecodeFailure(String),

    /// 输出图片编码失败
    #[error("图片编码失败: {0}")]
    Encode(String),

    /// 默认皮肤本身不可用（致命）
    #[error("默认皮肤不可用")]
    DefaultUnavailable,

    /// 本地存储读写失败
    #[error("存储错误: {0}")]
    Storage(String),
}

impl SkinError {
    /// 是否属于“源站获取失败”一类（可被旧缓存/默认皮肤回退吸收）
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            SkinError::OriginUnreachable(_)
                | SkinError::OriginNotFound
                | SkinError::Timeout
                | SkinError::DecodeFailure(_)
        )
    }
}

/// RFC7807 风格的错误响应（Problem Details）。
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）。若无更细分的类型，可使用 about:blank。
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题，用于概括错误。
    #[schema(example = "Bad Gateway")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）。
    #[schema(example = 502)]
    pub status: u16,

    /// 人类可读的详细信息（尽量稳定，不建议依赖解析）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// 稳定的错误码，用于程序化处理。
    #[schema(example = "UPSTREAM_ERROR")]
    pub code: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Skin(e) => match e {
                SkinError::DefaultUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                SkinError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                SkinError::OriginUnreachable(_)
                | SkinError::OriginNotFound
                | SkinError::DecodeFailure(_) => StatusCode::BAD_GATEWAY,
                SkinError::Storage(_) | SkinError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn stable_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Skin(e) => match e {
                SkinError::DefaultUnavailable => "DEFAULT_SKIN_UNAVAILABLE",
                SkinError::Timeout => "UPSTREAM_TIMEOUT",
                SkinError::OriginUnreachable(_) | SkinError::OriginNotFound => "UPSTREAM_ERROR",
                SkinError::DecodeFailure(_) => "SKIN_DECODE_FAILED",
                SkinError::Storage(_) => "STORAGE_ERROR",
                SkinError::Encode(_) => "IMAGE_ENCODE_FAILED",
            },
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::UNPROCESSABLE_ENTITY => "Validation Failed",
            StatusCode::BAD_GATEWAY => "Bad Gateway",
            StatusCode::GATEWAY_TIMEOUT => "Gateway Timeout",
            StatusCode::SERVICE_UNAVAILABLE => "Service Unavailable",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let problem = ProblemDetails {
            type_url: "about:blank".to_string(),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail: Some(self.to_string()),
            code: self.stable_code().to_string(),
        };

        let mut res = Json(problem).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<reqwest::Error> for SkinError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SkinError::Timeout
        } else {
            SkinError::OriginUnreachable(err.to_string())
        }
    }
}

impl From<std::io::Error> for SkinError {
    fn from(err: std::io::Error) -> Self {
        SkinError::Storage(err.to_string())
    }
}

impl From<image::ImageError> for SkinError {
    fn from(err: image::ImageError) -> Self {
        SkinError::DecodeFailure(err.to_string())
    }
}

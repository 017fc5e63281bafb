use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;

const X_REQUESTED: HeaderName = HeaderName::from_static("x-requested");
const X_RESULT: HeaderName = HeaderName::from_static("x-result");

/// 只读服务：跨域只放行读取类方法
const READ_METHODS: [Method; 2] = [Method::GET, Method::HEAD];

/// 根据配置构建 CORS 中间件
///
/// 图片与列表接口都是只读的，所以请求头固定放行 `If-None-Match`（条件请求），
/// 响应头暴露 ETag 与命中结果，浏览器端的 `<canvas>` / fetch 才能读到它们。
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    if !cors.enabled {
        return None;
    }

    let (any_origin, origins) = parse_list("allowed_origins", &cors.allowed_origins, |v| {
        HeaderValue::from_str(v).ok()
    });
    if !any_origin && origins.is_empty() {
        tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
        return None;
    }

    let mut layer = CorsLayer::new()
        .allow_methods(read_methods(&cors.allowed_methods))
        .allow_headers([header::IF_NONE_MATCH])
        .expose_headers([header::ETAG, X_REQUESTED, X_RESULT]);

    layer = if any_origin {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    };
    Some(layer)
}

/// 配置的方法与 GET/HEAD 取交集；留空或 `*` 表示全部读取方法
fn read_methods(configured: &[String]) -> Vec<Method> {
    let (any, methods) = parse_list("allowed_methods", configured, |v| {
        Method::from_bytes(v.to_ascii_uppercase().as_bytes()).ok()
    });
    if any || methods.is_empty() {
        return READ_METHODS.to_vec();
    }
    let mut allowed = Vec::new();
    for m in methods {
        if !READ_METHODS.contains(&m) {
            tracing::warn!("CORS allowed_methods 忽略非读取方法: {}", m);
        } else if !allowed.contains(&m) {
            allowed.push(m);
        }
    }
    if allowed.is_empty() {
        READ_METHODS.to_vec()
    } else {
        allowed
    }
}

/// 解析配置列表：`*` 记为通配，空白跳过，无法解析的值告警后丢弃
fn parse_list<T>(
    label: &str,
    values: &[String],
    parse: impl Fn(&str) -> Option<T>,
) -> (bool, Vec<T>) {
    let mut any = false;
    let mut out = Vec::new();
    for raw in values {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if value == "*" {
            any = true;
            continue;
        }
        match parse(value) {
            Some(v) => out.push(v),
            None => tracing::warn!("CORS {} 含无效值: {}", label, value),
        }
    }
    (any, out)
}

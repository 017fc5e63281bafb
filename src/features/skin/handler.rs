use axum::{
    Router,
    body::Body,
    extract::{MatchedPath, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::state::AppState;

use super::resolver::Rendered;
use super::types::{SkinKind, split_extension};

const X_REQUESTED: &str = "x-requested";
const X_RESULT: &str = "x-result";

/// 图片路由的首段，即输出种类（含 `avatar` / `player` 别名）
const IMAGE_ROUTES: [&str; 6] = ["avatar", "head", "helm", "skin", "body", "player"];

#[derive(Debug, Deserialize)]
pub struct ListingPath {
    #[serde(rename = "type")]
    kind: String,
    start: Option<String>,
}

/// `/all` 分页响应
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[schema(example = json!({
  "type": "head",
  "start": 0,
  "limit": 85,
  "total": 2,
  "usernames": ["char", "notch"]
}))]
pub struct ListingPage {
    #[serde(rename = "type")]
    pub kind: SkinKind,
    pub start: usize,
    pub limit: usize,
    pub total: usize,
    pub usernames: Vec<String>,
}

/// 响应体的 ETag：sha256 十六进制的前 32 位
pub fn etag_for(bytes: &[u8]) -> String {
    let hex = hex::encode(Sha256::digest(bytes));
    format!("\"{}\"", &hex[..32])
}

/// `If-None-Match` 是否命中（支持 `*`、弱校验前缀与逗号列表）
fn if_none_match_hits(headers: &HeaderMap, etag: &str) -> bool {
    let Some(raw) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    raw.split(',')
        .map(|t| t.trim().trim_start_matches("W/"))
        .any(|t| t == "*" || t == etag)
}

fn parse_kind(raw: &str) -> Result<SkinKind, AppError> {
    raw.parse::<SkinKind>().map_err(AppError::NotFound)
}

/// 从匹配到的路由模板（`/helm/:username`）取出输出种类
fn kind_from_route(route: &MatchedPath) -> Result<SkinKind, AppError> {
    let first = route
        .as_str()
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();
    parse_kind(first)
}

fn image_response(
    rendered: Rendered,
    headers: &HeaderMap,
    cache_control: HeaderValue,
) -> Result<Response, AppError> {
    let etag = etag_for(&rendered.bytes);
    let status = if rendered.not_found {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    let result = if rendered.not_found { "notfound" } else { "ok" };
    let etag_value =
        HeaderValue::from_str(&etag).map_err(|e| AppError::Internal(format!("ETag 非法: {e}")))?;

    let mut builder = Response::builder()
        .header(header::CACHE_CONTROL, cache_control)
        .header(header::ETAG, etag_value)
        .header(X_REQUESTED, rendered.kind.as_str())
        .header(X_RESULT, result);

    let resp = if !rendered.not_found && if_none_match_hits(headers, &etag) {
        builder = builder.status(StatusCode::NOT_MODIFIED);
        builder.body(Body::empty())
    } else {
        builder
            .status(status)
            .header(header::CONTENT_TYPE, rendered.content_type())
            .body(Body::from(rendered.bytes))
    };
    resp.map_err(|e| AppError::Internal(format!("构建响应失败: {e}")))
}

fn public_cache_control(state: &AppState) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!("public, max-age={}", state.cache_max_age_secs))
        .map_err(|e| AppError::Internal(format!("Cache-Control 非法: {e}")))
}

async fn serve_image(
    state: AppState,
    kind: SkinKind,
    username: &str,
    size: Option<&str>,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    // 扩展名可以挂在玩家名上，也可以挂在尺寸上（`/helm/Notch/100.jpg`）
    let (username, name_ext) = split_extension(username);
    let (size, size_ext) = match size {
        Some(s) => {
            let (s, ext) = split_extension(s);
            (Some(s), ext)
        }
        None => (None, None),
    };
    let format = size_ext.or(name_ext);

    let rendered = state
        .resolver
        .resolve(username, kind, size, format)
        .await?;
    image_response(rendered, headers, public_cache_control(&state)?)
}

#[utoipa::path(
    get,
    path = "/{kind}/{username}",
    summary = "玩家头像 / 皮肤（默认尺寸）",
    description = "kind 为 avatar|head|helm|skin|body|player。username 可携带扩展名（.png/.jpg）选择输出格式。玩家不存在时返回 404，但响应体仍是默认皮肤的渲染结果。",
    params(
        ("kind" = String, Path, description = "输出种类"),
        ("username" = String, Path, description = "玩家名，可带 .png/.jpg 后缀")
    ),
    responses(
        (status = 200, description = "渲染成功", content_type = "image/png"),
        (status = 304, description = "If-None-Match 命中"),
        (status = 404, description = "玩家不存在，返回默认皮肤", content_type = "image/png"),
        (
            status = 503,
            description = "默认皮肤不可用",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Skin"
)]
pub async fn get_image(
    State(state): State<AppState>,
    route: MatchedPath,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let kind = kind_from_route(&route)?;
    serve_image(state, kind, &username, None, &headers).await
}

#[utoipa::path(
    get,
    path = "/{kind}/{username}/{size}",
    summary = "玩家头像 / 皮肤（指定尺寸）",
    description = "size 钳制到 [16, 1000]，非数字使用默认值 180；size 也可携带扩展名（如 100.jpg）。",
    params(
        ("kind" = String, Path, description = "输出种类"),
        ("username" = String, Path, description = "玩家名"),
        ("size" = String, Path, description = "边长（像素），可带 .png/.jpg 后缀")
    ),
    responses(
        (status = 200, description = "渲染成功", content_type = "image/png"),
        (status = 304, description = "If-None-Match 命中"),
        (status = 404, description = "玩家不存在，返回默认皮肤", content_type = "image/png"),
        (
            status = 503,
            description = "默认皮肤不可用",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Skin"
)]
pub async fn get_image_sized(
    State(state): State<AppState>,
    route: MatchedPath,
    Path((username, size)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let kind = kind_from_route(&route)?;
    serve_image(state, kind, &username, Some(&size), &headers).await
}

#[utoipa::path(
    get,
    path = "/download/{username}",
    summary = "下载原始皮肤",
    params(("username" = String, Path, description = "玩家名")),
    responses(
        (status = 200, description = "原始皮肤 PNG", content_type = "image/png"),
        (status = 404, description = "玩家不存在，返回默认皮肤", content_type = "image/png")
    ),
    tag = "Skin"
)]
pub async fn download_skin(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    let (username, _) = split_extension(&username);
    let skin = state.resolver.raw_skin(username).await?;
    let status = if skin.substituted {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}.png\"", skin.key))
        .map_err(|e| AppError::Internal(format!("Content-Disposition 非法: {e}")))?;

    Ok((
        status,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        skin.bytes,
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/refresh/{username}",
    summary = "强制刷新皮肤缓存",
    description = "无视新鲜度立即回源。成功后 302 跳转到该玩家的头像；回源失败时保留原缓存并返回错误。",
    params(("username" = String, Path, description = "玩家名（源站区分大小写）")),
    responses(
        (status = 302, description = "刷新成功"),
        (
            status = 502,
            description = "源站不可用或玩家不存在",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 504,
            description = "源站超时",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Skin"
)]
pub async fn refresh_skin(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    state.resolver.refresh(&username).await?;
    let location = HeaderValue::from_str(&format!("/avatar/{username}"))
        .map_err(|e| AppError::Validation(format!("玩家名无法用于跳转: {e}")))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

async fn serve_random(state: AppState, size: Option<&str>) -> Result<Response, AppError> {
    let (size, format) = match size {
        Some(s) => {
            let (s, ext) = split_extension(s);
            (Some(s), ext)
        }
        None => (None, None),
    };
    let Some((name, rendered)) = state.resolver.random(size, format).await? else {
        return Err(AppError::NotFound("尚无已缓存的皮肤".into()));
    };
    tracing::debug!(name, "随机头像");
    image_response(
        rendered,
        &HeaderMap::new(),
        HeaderValue::from_static("no-cache, must-revalidate"),
    )
}

#[utoipa::path(
    get,
    path = "/random",
    summary = "随机头像",
    description = "从已缓存的玩家中随机挑选一个并返回其头像（默认尺寸）。",
    responses(
        (status = 200, description = "渲染成功", content_type = "image/png"),
        (
            status = 404,
            description = "尚无已缓存的皮肤",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Skin"
)]
pub async fn get_random(State(state): State<AppState>) -> Result<Response, AppError> {
    serve_random(state, None).await
}

#[utoipa::path(
    get,
    path = "/random/{size}",
    summary = "随机头像（指定尺寸）",
    params(("size" = String, Path, description = "边长（像素），可带 .png/.jpg 后缀")),
    responses(
        (status = 200, description = "渲染成功", content_type = "image/png"),
        (
            status = 404,
            description = "尚无已缓存的皮肤",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Skin"
)]
pub async fn get_random_sized(
    State(state): State<AppState>,
    Path(size): Path<String>,
) -> Result<Response, AppError> {
    serve_random(state, Some(&size)).await
}

#[utoipa::path(
    get,
    path = "/all/{type}/{start}",
    summary = "已缓存玩家列表（分页）",
    description = "按玩家名排序，每页固定条数；start 非数字时按 0 处理。`/all/{type}` 等价于 start = 0。",
    params(
        ("type" = String, Path, description = "head|helm|skin"),
        ("start" = Option<String>, Path, description = "起始偏移")
    ),
    responses(
        (status = 200, description = "分页结果", body = ListingPage),
        (
            status = 404,
            description = "未知的输出种类",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Skin"
)]
pub async fn list_all(
    State(state): State<AppState>,
    Path(p): Path<ListingPath>,
) -> Result<Json<ListingPage>, AppError> {
    let kind = parse_kind(&p.kind)?;
    let start = p
        .start
        .as_deref()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let limit = state.page_size.max(1);

    let names = state.resolver.sorted_usernames().await?;
    let total = names.len();
    let usernames = names.into_iter().skip(start).take(limit).collect();

    Ok(Json(ListingPage {
        kind,
        start,
        limit,
        total,
        usernames,
    }))
}

pub fn create_skin_router() -> Router<AppState> {
    let mut router = Router::new()
        .route("/download/:username", get(download_skin))
        .route("/refresh/:username", get(refresh_skin))
        .route("/random", get(get_random))
        .route("/random/:size", get(get_random_sized))
        .route("/all/:type", get(list_all))
        .route("/all/:type/:start", get(list_all));
    for kind in IMAGE_ROUTES {
        router = router
            .route(&format!("/{kind}/:username"), get(get_image))
            .route(&format!("/{kind}/:username/:size"), get(get_image_sized));
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_image_route_maps_to_a_kind() {
        for kind in IMAGE_ROUTES {
            assert!(parse_kind(kind).is_ok(), "{kind}");
        }
    }

    #[test]
    fn etag_is_quoted_32_hex_chars() {
        let e = etag_for(b"hello");
        assert_eq!(e.len(), 34);
        assert!(e.starts_with('"') && e.ends_with('"'));
        assert_eq!(e, etag_for(b"hello"));
        assert_ne!(e, etag_for(b"hello!"));
    }

    #[test]
    fn if_none_match_accepts_lists_and_weak_tags() {
        let etag = etag_for(b"x");
        let mut h = HeaderMap::new();
        assert!(!if_none_match_hits(&h, &etag));

        h.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_str(&format!("\"nope\", W/{etag}")).unwrap(),
        );
        assert!(if_none_match_hits(&h, &etag));

        h.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(if_none_match_hits(&h, &etag));
    }
}

use axum::Router;
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::CorsConfig;
use crate::cors::build_cors_layer;
use crate::features::{health, skin, stats};
use crate::openapi::ApiDoc;
use crate::state::AppState;

fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    // 图片本身已压缩，只对 JSON / problem+json 等文本响应启用 gzip/brotli
    SizeAbove::default()
        .and(NotForContentType::GRPC)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
        .and(NotForContentType::const_new("application/octet-stream"))
}

/// 组装完整路由：业务路由 + 文档 + 压缩 + 可选 CORS
pub fn build_router(state: AppState, cors: &CorsConfig) -> Router {
    let mut app = Router::<AppState>::new()
        .merge(health::create_health_router())
        .merge(stats::handler::create_stats_router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(skin::create_skin_router())
        .with_state(state);

    app = app.layer(CompressionLayer::new().compress_when(compression_predicate()));

    if let Some(layer) = build_cors_layer(cors) {
        app = app.layer(layer);
    }
    app
}

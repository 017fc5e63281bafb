use axum::{Json, Router, extract::State, routing::get};

use crate::state::AppState;

use super::StatsSnapshot;

#[utoipa::path(
    get,
    path = "/stats",
    summary = "运行计数",
    description = "返回进程启动以来各输出种类的请求数、缓存命中情况、源站请求与失败次数。",
    responses((status = 200, description = "计数快照", body = StatsSnapshot)),
    tag = "Stats"
)]
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

pub fn create_stats_router() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}

use std::sync::Arc;

use crate::config::AppConfig;
use crate::features::skin::Resolver;
use crate::features::stats::SkinStats;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 渲染入口（内部持有皮肤缓存与渲染信号量）
    pub resolver: Arc<Resolver>,
    /// 进程内计数器
    pub stats: Arc<SkinStats>,
    /// 图片响应的 `Cache-Control: max-age`
    pub cache_max_age_secs: u64,
    /// `/all` 每页条数
    pub page_size: usize,
}

impl AppState {
    pub fn new(resolver: Arc<Resolver>, stats: Arc<SkinStats>, config: &AppConfig) -> Self {
        Self {
            resolver,
            stats,
            cache_max_age_secs: config.image.cache_control_max_age_secs,
            page_size: config.listing.page_size,
        }
    }
}

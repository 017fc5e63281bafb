pub mod handler;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::features::skin::types::SkinKind;

/// 进程内计数器（无锁原子累加，重启清零）
#[derive(Debug)]
pub struct SkinStats {
    started_at: Instant,
    requested_head: AtomicU64,
    requested_helm: AtomicU64,
    requested_skin: AtomicU64,
    requested_body: AtomicU64,
    cache_fresh: AtomicU64,
    cache_stale: AtomicU64,
    cache_miss: AtomicU64,
    origin_fetches: AtomicU64,
    origin_failures: AtomicU64,
    default_substitutions: AtomicU64,
    refreshes: AtomicU64,
    render_cache_hits: AtomicU64,
}

impl Default for SkinStats {
    fn default() -> Self {
        Self::new()
    }
}

/// `/stats` 响应体
#[derive(Debug, Clone, Serialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requested: RequestedCounts,
    pub cache: CacheCounts,
    pub origin: OriginCounts,
    pub default_substitutions: u64,
    pub refreshes: u64,
    pub render_cache_hits: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, utoipa::ToSchema)]
pub struct RequestedCounts {
    pub head: u64,
    pub helm: u64,
    pub skin: u64,
    pub body: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, utoipa::ToSchema)]
pub struct CacheCounts {
    pub fresh: u64,
    pub stale: u64,
    pub miss: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, utoipa::ToSchema)]
pub struct OriginCounts {
    pub fetches: u64,
    pub failures: u64,
}

fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

fn read(c: &AtomicU64) -> u64 {
    c.load(Ordering::Relaxed)
}

impl SkinStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requested_head: AtomicU64::new(0),
            requested_helm: AtomicU64::new(0),
            requested_skin: AtomicU64::new(0),
            requested_body: AtomicU64::new(0),
            cache_fresh: AtomicU64::new(0),
            cache_stale: AtomicU64::new(0),
            cache_miss: AtomicU64::new(0),
            origin_fetches: AtomicU64::new(0),
            origin_failures: AtomicU64::new(0),
            default_substitutions: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            render_cache_hits: AtomicU64::new(0),
        }
    }

    pub fn requested(&self, kind: SkinKind) {
        match kind {
            SkinKind::Head => bump(&self.requested_head),
            SkinKind::Helm => bump(&self.requested_helm),
            SkinKind::Skin => bump(&self.requested_skin),
            SkinKind::Body => bump(&self.requested_body),
        }
    }

    pub fn cache_fresh(&self) {
        bump(&self.cache_fresh);
    }

    pub fn cache_stale(&self) {
        bump(&self.cache_stale);
    }

    pub fn cache_miss(&self) {
        bump(&self.cache_miss);
    }

    pub fn origin_fetch(&self) {
        bump(&self.origin_fetches);
    }

    pub fn origin_failure(&self) {
        bump(&self.origin_failures);
    }

    pub fn default_substitution(&self) {
        bump(&self.default_substitutions);
    }

    pub fn refresh(&self) {
        bump(&self.refreshes);
    }

    pub fn render_cache_hit(&self) {
        bump(&self.render_cache_hits);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            requested: RequestedCounts {
                head: read(&self.requested_head),
                helm: read(&self.requested_helm),
                skin: read(&self.requested_skin),
                body: read(&self.requested_body),
            },
            cache: CacheCounts {
                fresh: read(&self.cache_fresh),
                stale: read(&self.cache_stale),
                miss: read(&self.cache_miss),
            },
            origin: OriginCounts {
                fetches: read(&self.origin_fetches),
                failures: read(&self.origin_failures),
            },
            default_substitutions: read(&self.default_substitutions),
            refreshes: read(&self.refreshes),
            render_cache_hits: read(&self.render_cache_hits),
        }
    }
}

//! 皮肤缓存策略：新鲜命中 → 回源 → 旧缓存兜底 → 默认皮肤兜底。
//!
//! 用一点时效性换可用性：只要某个玩家曾经被成功取回过，源站故障就不会
//! 让该玩家的请求失败。默认皮肤的回退只允许一跳。

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use image::RgbaImage;
use moka::future::Cache;
use tokio::sync::Mutex;

use crate::error::SkinError;
use crate::features::stats::SkinStats;

use super::compositor::decode_skin;
use super::origin::SkinOrigin;
use super::store::{SkinStore, StoredSkin, is_safe_key};

/// 一次解析的结果
#[derive(Debug, Clone)]
pub struct ResolvedSkin {
    /// 实际提供内容的存储 key（发生默认替换时为默认皮肤的 key）
    pub key: String,
    /// 解码后的位图
    pub image: RgbaImage,
    /// 原始 PNG 字节
    pub bytes: Bytes,
    pub fetched_at: DateTime<Utc>,
    /// 请求的玩家不存在/不可用，返回的是默认皮肤
    pub substituted: bool,
    /// 回源失败，返回的是过期缓存
    pub stale: bool,
}

enum Lookup {
    Hit(ResolvedSkin),
    Miss(SkinError),
}

pub struct SkinCache {
    store: Arc<dyn SkinStore>,
    origin: Arc<dyn SkinOrigin>,
    expires: Duration,
    default_key: String,
    /// 每个 key 一把异步锁，合并同一玩家的并发回源；空闲一段时间后自动淘汰
    locks: Cache<String, Arc<Mutex<()>>>,
    stats: Arc<SkinStats>,
}

impl SkinCache {
    pub fn new(
        store: Arc<dyn SkinStore>,
        origin: Arc<dyn SkinOrigin>,
        expires: Duration,
        default_name: &str,
        stats: Arc<SkinStats>,
    ) -> Self {
        Self {
            store,
            origin,
            expires,
            default_key: default_name.to_ascii_lowercase(),
            locks: Cache::builder()
                .max_capacity(10_000)
                .time_to_idle(Duration::from_secs(60))
                .build(),
            stats,
        }
    }

    pub fn store(&self) -> &Arc<dyn SkinStore> {
        &self.store
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    /// 按玩家名解析皮肤。
    ///
    /// - `force_refresh = false`：正常请求路径，源站失败会被旧缓存/默认皮肤吸收；
    /// - `force_refresh = true`：无视新鲜度强制回源，失败时保留原缓存并返回错误。
    pub async fn resolve(&self, name: &str, force_refresh: bool) -> Result<ResolvedSkin, SkinError> {
        let name = name.trim();
        let name = if name.is_empty() {
            self.default_key.as_str()
        } else {
            name
        };
        let is_default = name.eq_ignore_ascii_case(&self.default_key);

        let cause = match self.lookup(name, force_refresh).await {
            Lookup::Hit(skin) => return Ok(skin),
            Lookup::Miss(cause) => cause,
        };

        if force_refresh {
            return Err(cause);
        }
        if is_default {
            tracing::error!("默认皮肤不可用: {}", cause);
            return Err(SkinError::DefaultUnavailable);
        }

        // 单跳回退：请求 → 默认皮肤，不会再从默认皮肤继续回退
        tracing::debug!(name, "玩家皮肤不可用（{}），改用默认皮肤", cause);
        match self.lookup(&self.default_key, false).await {
            Lookup::Hit(mut skin) => {
                self.stats.default_substitution();
                skin.substituted = true;
                Ok(skin)
            }
            Lookup::Miss(default_cause) => {
                tracing::error!("默认皮肤不可用: {}", default_cause);
                Err(SkinError::DefaultUnavailable)
            }
        }
    }

    /// 强制刷新：无论新鲜度都回源一次，成功则覆盖缓存。
    pub async fn refresh(&self, name: &str) -> Result<ResolvedSkin, SkinError> {
        self.stats.refresh();
        self.resolve(name, true).await
    }

    /// 若存储中尚无默认皮肤，则写入随包分发的默认皮肤。返回是否实际写入。
    pub async fn seed_default(&self, bytes: Bytes) -> Result<bool, SkinError> {
        if self.store.exists(&self.default_key).await? {
            return Ok(false);
        }
        decode_skin(&bytes)?;
        self.store
            .put(&self.default_key, StoredSkin::new(bytes, Utc::now(), true))
            .await?;
        Ok(true)
    }

    async fn lookup(&self, name: &str, force: bool) -> Lookup {
        let key = name.to_ascii_lowercase();
        if !is_safe_key(&key) {
            // 非法玩家名既不能落盘也不会存在于源站
            return Lookup::Miss(SkinError::OriginNotFound);
        }

        if !force && let Some(hit) = self.fresh_entry(&key).await {
            return Lookup::Hit(hit);
        }

        let lock = self
            .locks
            .get_with(key.clone(), async { Arc::new(Mutex::new(())) })
            .await;
        let _guard = lock.lock().await;

        // 等锁期间可能已有其他请求完成了回源
        let existing = self.load(&key).await;
        if !force
            && let Some(entry) = existing.as_ref()
            && entry.0.age() < self.expires
        {
            self.stats.cache_fresh();
            return Lookup::Hit(entry.1.clone());
        }
        // 过期条目不算未命中：回源失败时它会按 stale 计数
        if !force && existing.is_none() {
            self.stats.cache_miss();
        }

        match self.fetch_and_store(name, &key).await {
            Ok(skin) => Lookup::Hit(skin),
            Err(cause) if force => Lookup::Miss(cause),
            Err(cause) => match existing {
                Some((_, mut stale)) => {
                    tracing::warn!(key, "回源失败，继续使用过期缓存: {}", cause);
                    self.stats.cache_stale();
                    stale.stale = true;
                    Lookup::Hit(stale)
                }
                None => Lookup::Miss(cause),
            },
        }
    }

    /// 新鲜命中快路径，不触发任何网络请求
    async fn fresh_entry(&self, key: &str) -> Option<ResolvedSkin> {
        let (stored, resolved) = self.load(key).await?;
        if stored.age() < self.expires {
            self.stats.cache_fresh();
            tracing::debug!(key, "缓存新鲜命中");
            Some(resolved)
        } else {
            None
        }
    }

    /// 读取并解码已缓存条目；读取失败或内容损坏都按不存在处理
    async fn load(&self, key: &str) -> Option<(StoredSkin, ResolvedSkin)> {
        let stored = match self.store.get(key).await {
            Ok(Some(s)) => s,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, "读取皮肤缓存失败: {}", e);
                return None;
            }
        };
        match decode_skin(&stored.bytes) {
            Ok(image) => {
                let resolved = ResolvedSkin {
                    key: key.to_string(),
                    image,
                    bytes: stored.bytes.clone(),
                    fetched_at: stored.fetched_at,
                    substituted: false,
                    stale: false,
                };
                Some((stored, resolved))
            }
            Err(e) => {
                tracing::warn!(key, "缓存中的皮肤已损坏，忽略: {}", e);
                None
            }
        }
    }

    /// 回源（原始大小写）→ 解码校验 → 按小写 key 落盘
    async fn fetch_and_store(&self, name: &str, key: &str) -> Result<ResolvedSkin, SkinError> {
        let started = Instant::now();
        self.stats.origin_fetch();
        let fetched = self
            .origin
            .fetch(name)
            .await
            .and_then(|bytes| decode_skin(&bytes).map(|image| (bytes, image)));
        let (bytes, image) = match fetched {
            Ok(v) => v,
            Err(e) => {
                self.stats.origin_failure();
                tracing::warn!(
                    name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "获取皮肤失败: {}",
                    e
                );
                return Err(e);
            }
        };

        let fetched_at = Utc::now();
        let entry = StoredSkin::new(bytes.clone(), fetched_at, key == self.default_key);
        if let Err(e) = self.store.put(key, entry).await {
            // 落盘失败不影响本次响应
            tracing::warn!(key, "写入皮肤缓存失败: {}", e);
        }
        tracing::debug!(
            name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "回源获取皮肤成功"
        );

        Ok(ResolvedSkin {
            key: key.to_string(),
            image,
            bytes,
            fetched_at,
            substituted: false,
            stale: false,
        })
    }
}

//! 路由层的唯一入口：`(username, kind, size, format)` → 编码后的图片字节。

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use image::RgbaImage;
use moka::future::Cache;
use rand::seq::SliceRandom;
use tokio::sync::Semaphore;

use crate::config::ImageConfig;
use crate::error::SkinError;
use crate::features::stats::SkinStats;

use super::cache::{ResolvedSkin, SkinCache};
use super::compositor;
use super::types::{OutputFormat, SizeBounds, SkinKind};

/// 一次渲染的结果
#[derive(Debug, Clone)]
pub struct Rendered {
    pub bytes: Bytes,
    pub kind: SkinKind,
    pub format: OutputFormat,
    pub size: u32,
    /// 请求的玩家不可用，`bytes` 是默认皮肤的渲染结果
    pub not_found: bool,
}

impl Rendered {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// 按种类截取区域并缩放（纯 CPU 计算）
pub fn derive(skin: &RgbaImage, kind: SkinKind, size: u32) -> RgbaImage {
    let region = match kind {
        SkinKind::Head => compositor::head(skin),
        SkinKind::Helm => compositor::composite(skin),
        SkinKind::Skin | SkinKind::Body => skin.clone(),
    };
    compositor::resize(&region, size)
}

pub struct Resolver {
    cache: Arc<SkinCache>,
    bounds: SizeBounds,
    jpeg_quality: u8,
    /// 控制并发渲染的信号量（限制 CPU 密集型任务数量）
    render_semaphore: Arc<Semaphore>,
    /// 渲染结果缓存（按字节数加权），只收录真实命中的玩家
    render_cache: Option<Cache<String, Bytes>>,
    stats: Arc<SkinStats>,
}

impl Resolver {
    pub fn new(cache: Arc<SkinCache>, cfg: &ImageConfig, stats: Arc<SkinStats>) -> Self {
        let render_cache = cfg.render_cache_enabled.then(|| {
            Cache::builder()
                .weigher(|_k, v: &Bytes| u32::try_from(v.len()).unwrap_or(u32::MAX))
                .max_capacity(cfg.render_cache_max_bytes)
                .time_to_live(Duration::from_secs(cfg.render_cache_ttl_secs))
                .support_invalidation_closures()
                .build()
        });
        Self {
            cache,
            bounds: SizeBounds {
                default: cfg.default_size,
                min: cfg.min_size,
                max: cfg.max_size,
            },
            jpeg_quality: cfg.jpeg_quality,
            render_semaphore: Arc::new(Semaphore::new(cfg.effective_parallelism())),
            render_cache,
            stats,
        }
    }

    /// 解析并渲染。参数非法（尺寸、格式）从不报错，一律钳制/回退；
    /// 唯一的硬失败是默认皮肤本身不可用。
    pub async fn resolve(
        &self,
        username: &str,
        kind: SkinKind,
        size: Option<&str>,
        format: Option<&str>,
    ) -> Result<Rendered, SkinError> {
        self.stats.requested(kind);
        let size = self.bounds.resolve(size);
        let format = OutputFormat::parse_lenient(format);
        let key = username.trim().to_ascii_lowercase();
        let cache_key = format!("{key}:{kind}:{size}:{}", format.code());

        if let Some(cache) = &self.render_cache
            && let Some(bytes) = cache.get(&cache_key).await
        {
            self.stats.render_cache_hit();
            tracing::debug!(key, %kind, size, "渲染缓存命中");
            return Ok(Rendered {
                bytes,
                kind,
                format,
                size,
                not_found: false,
            });
        }

        let started = Instant::now();
        let skin = self.cache.resolve(username, false).await?;
        let not_found = skin.substituted;
        let bytes = self.render(skin, kind, size, format).await?;

        // 源站区分大小写：替换结果不能以小写键缓存，否则会遮住大小写不同的真实玩家
        if !not_found && let Some(cache) = &self.render_cache {
            cache.insert(cache_key, bytes.clone()).await;
        }
        tracing::debug!(
            key,
            %kind,
            size,
            not_found,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "渲染完成"
        );

        Ok(Rendered {
            bytes,
            kind,
            format,
            size,
            not_found,
        })
    }

    /// 强制回源刷新，丢弃位图，仅用于失效缓存。
    pub async fn refresh(&self, username: &str) -> Result<(), SkinError> {
        let skin = self.cache.refresh(username).await?;
        if let Some(cache) = &self.render_cache {
            let prefix = format!("{}:", skin.key);
            if let Err(e) = cache.invalidate_entries_if(move |k, _v: &Bytes| k.starts_with(&prefix)) {
                tracing::warn!("渲染缓存失效失败: {}", e);
            }
        }
        tracing::info!(key = %skin.key, "皮肤已刷新");
        Ok(())
    }

    /// 原始皮肤（下载用）
    pub async fn raw_skin(&self, username: &str) -> Result<ResolvedSkin, SkinError> {
        self.cache.resolve(username, false).await
    }

    /// 惰性、可重复消费的已缓存玩家名序列
    pub fn list_cached_usernames(&self) -> BoxStream<'static, Result<String, SkinError>> {
        self.cache.store().list()
    }

    /// 排序后的完整列表（分页用）
    pub async fn sorted_usernames(&self) -> Result<Vec<String>, SkinError> {
        let mut names: Vec<String> = self.list_cached_usernames().try_collect().await?;
        names.sort_unstable();
        Ok(names)
    }

    /// 随机挑选一个已缓存玩家并渲染头像；存储为空时返回 `None`。不经过渲染缓存。
    pub async fn random(
        &self,
        size: Option<&str>,
        format: Option<&str>,
    ) -> Result<Option<(String, Rendered)>, SkinError> {
        let names: Vec<String> = self.list_cached_usernames().try_collect().await?;
        let Some(name) = names.choose(&mut rand::thread_rng()).cloned() else {
            return Ok(None);
        };

        self.stats.requested(SkinKind::Head);
        let size = self.bounds.resolve(size);
        let format = OutputFormat::parse_lenient(format);
        let skin = self.cache.resolve(&name, false).await?;
        let not_found = skin.substituted;
        let bytes = self.render(skin, SkinKind::Head, size, format).await?;
        Ok(Some((
            name,
            Rendered {
                bytes,
                kind: SkinKind::Head,
                format,
                size,
                not_found,
            },
        )))
    }

    async fn render(
        &self,
        skin: ResolvedSkin,
        kind: SkinKind,
        size: u32,
        format: OutputFormat,
    ) -> Result<Bytes, SkinError> {
        let permit = self
            .render_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SkinError::Encode(format!("获取渲染信号量失败: {e}")))?;
        let quality = self.jpeg_quality;
        // 解码后的缩放/编码是 CPU 密集操作，移出 tokio worker
        let encoded = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            compositor::encode(&derive(&skin.image, kind, size), format, quality)
        })
        .await
        .map_err(|e| SkinError::Encode(format!("阻塞渲染任务执行失败: {e}")))??;
        Ok(Bytes::from(encoded))
    }
}

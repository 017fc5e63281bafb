use std::fs;
use std::path::Path;

use axum::body::Bytes;

use crate::config::{AppConfig, SkinStorageKind};
use crate::error::AppError;
use crate::features::skin::SkinCache;

/// 执行启动检查
///
/// 1. 文件系统存储时，检查并创建皮肤缓存目录
/// 2. 配置了随包默认皮肤时，预置默认皮肤缓存
pub async fn run_startup_checks(config: &AppConfig, cache: &SkinCache) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    if config.skin.storage == SkinStorageKind::Fs {
        ensure_cache_dir(&config.skin.skins_dir())?;
    }

    match config.skin.default_skin_path.as_deref() {
        Some(path) => seed_default_skin(cache, Path::new(path)).await?,
        None => tracing::info!(
            "未配置 default_skin_path，默认皮肤 {} 将在首次使用时回源获取",
            config.skin.default_skin
        ),
    }

    tracing::info!("✅ 启动检查完成");
    Ok(())
}

/// 确保皮肤缓存目录存在
pub fn ensure_cache_dir(dir: &Path) -> Result<(), AppError> {
    if dir.exists() {
        tracing::info!("✅ 皮肤缓存目录已存在: {:?}", dir);
        return Ok(());
    }
    tracing::warn!("📁 未找到皮肤缓存目录，正在创建: {:?}", dir);
    fs::create_dir_all(dir)
        .map_err(|e| AppError::Internal(format!("创建皮肤缓存目录失败: {e}")))?;
    tracing::info!("✅ 皮肤缓存目录创建成功");
    Ok(())
}

/// 存储中尚无默认皮肤时，写入随包分发的 PNG
pub async fn seed_default_skin(cache: &SkinCache, path: &Path) -> Result<(), AppError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::Internal(format!("读取默认皮肤 {path:?} 失败: {e}")))?;
    if cache.seed_default(Bytes::from(bytes)).await? {
        tracing::info!("✅ 已从 {:?} 预置默认皮肤 {}", path, cache.default_key());
    } else {
        tracing::info!("✅ 默认皮肤 {} 已存在于缓存中", cache.default_key());
    }
    Ok(())
}

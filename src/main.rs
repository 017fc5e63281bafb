use std::sync::Arc;

use minotar_backend::config::{AppConfig, SkinStorageKind};
use minotar_backend::features::skin::{
    FsSkinStore, HttpSkinOrigin, MemorySkinStore, Resolver, SkinCache, SkinStore,
};
use minotar_backend::features::stats::SkinStats;
use minotar_backend::startup::run_startup_checks;
use minotar_backend::state::AppState;
use minotar_backend::{ShutdownManager, build_router};

#[tokio::main]
async fn main() {
    // 配置先于日志加载：RUST_LOG 缺省时使用 logging.level
    let config_result = AppConfig::init_global();
    let fallback_level = config_result
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("minotar_backend={fallback_level},tower_http={fallback_level}").into()
            }),
        )
        .init();

    let config = match config_result {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Config init failed: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("已从 {:?} 加载配置文件", AppConfig::config_path());
    tracing::debug!(
        "配置加载完成: origin = {}, cache_dir = {}, expires = {}s",
        config.skin.origin_template,
        config.skin.cache_dir,
        config.skin.expires_secs
    );

    // 创建优雅退出管理器并启动信号处理器
    let shutdown_manager = ShutdownManager::new();
    if let Err(e) = shutdown_manager.start_signal_handler() {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    // 存储后端
    let store: Arc<dyn SkinStore> = match config.skin.storage {
        SkinStorageKind::Fs => Arc::new(FsSkinStore::new(config.skin.skins_dir())),
        SkinStorageKind::Memory => {
            tracing::warn!("使用内存皮肤存储，重启后缓存将丢失");
            Arc::new(MemorySkinStore::new())
        }
    };

    let origin = match HttpSkinOrigin::from_config(&config.skin) {
        Ok(o) => Arc::new(o),
        Err(e) => {
            tracing::error!("Origin client init failed: {}", e);
            std::process::exit(1);
        }
    };

    let stats = Arc::new(SkinStats::new());
    let cache = Arc::new(SkinCache::new(
        store,
        origin,
        config.skin.expires_duration(),
        &config.skin.default_skin,
        stats.clone(),
    ));

    if let Err(e) = run_startup_checks(config, &cache).await {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    let resolver = Arc::new(Resolver::new(cache, &config.image, stats.clone()));
    let app_state = AppState::new(resolver, stats, config);
    let app = build_router(app_state, &config.cors);

    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Origin: {}", config.skin.origin_template);
    tracing::info!(
        "Skin storage: {:?} ({:?})",
        config.skin.storage,
        config.skin.skins_dir()
    );

    // 排空超时后强制退出
    shutdown_manager.spawn_drain_deadline(config.shutdown.timeout_duration());

    let shutdown_signal = {
        let manager = shutdown_manager.clone();
        async move {
            let reason = manager.wait_for_shutdown().await;
            tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
    {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    tracing::info!("服务器已优雅关闭");
}

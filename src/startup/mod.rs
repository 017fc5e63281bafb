/// 启动检查（缓存目录、默认皮肤预置）
pub mod checks;

pub use checks::{ensure_cache_dir, run_startup_checks, seed_default_skin};

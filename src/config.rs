use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 全局配置单例（仅供进程启动阶段使用，组件通过构造参数接收各自的配置段）
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（未设置 RUST_LOG 时生效）
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// CORS 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default)]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// 允许的方法，只接受 GET / HEAD（留空或 "*" 表示两者）
    #[serde(default)]
    pub allowed_methods: Vec<String>,
}

/// 皮肤存储后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SkinStorageKind {
    /// 本地文件系统（`<cache_dir>/skins/<name>.png`）
    #[default]
    Fs,
    /// 进程内存（重启即丢失，适合测试/临时部署）
    Memory,
}

/// 皮肤源站与本地缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkinConfig {
    /// 源站 URL 模板，`{username}` 会被替换为原样（保留大小写）的玩家名
    #[serde(default = "SkinConfig::default_origin_template")]
    pub origin_template: String,
    /// 请求源站时携带的 User-Agent
    #[serde(default = "SkinConfig::default_user_agent")]
    pub user_agent: String,
    /// 源站请求超时（秒）
    #[serde(default = "SkinConfig::default_timeout")]
    pub timeout_secs: u64,
    /// 缓存新鲜度阈值（秒），超过后下次请求会尝试回源刷新
    #[serde(default = "SkinConfig::default_expires")]
    pub expires_secs: u64,
    /// 存储后端
    #[serde(default)]
    pub storage: SkinStorageKind,
    /// 缓存根目录（皮肤存放在 `<cache_dir>/skins/` 下）
    #[serde(default = "SkinConfig::default_cache_dir")]
    pub cache_dir: String,
    /// 默认皮肤标识
    #[serde(default = "SkinConfig::default_skin")]
    pub default_skin: String,
    /// 随包分发的默认皮肤 PNG，启动时用于预置默认皮肤缓存
    #[serde(default)]
    pub default_skin_path: Option<String>,
}

impl SkinConfig {
    fn default_origin_template() -> String {
        "http://s3.amazonaws.com/MinecraftSkins/{username}.png".to_string()
    }
    fn default_user_agent() -> String {
        concat!("minotar-backend/", env!("CARGO_PKG_VERSION")).to_string()
    }
    fn default_timeout() -> u64 {
        10
    }
    fn default_expires() -> u64 {
        86400
    }
    fn default_cache_dir() -> String {
        "./minecraft".to_string()
    }
    fn default_skin() -> String {
        "char".to_string()
    }

    /// 源站请求超时
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// 缓存新鲜度阈值
    pub fn expires_duration(&self) -> Duration {
        Duration::from_secs(self.expires_secs)
    }

    /// 皮肤文件目录
    pub fn skins_dir(&self) -> PathBuf {
        PathBuf::from(&self.cache_dir).join("skins")
    }
}

impl Default for SkinConfig {
    fn default() -> Self {
        Self {
            origin_template: Self::default_origin_template(),
            user_agent: Self::default_user_agent(),
            timeout_secs: Self::default_timeout(),
            expires_secs: Self::default_expires(),
            storage: SkinStorageKind::default(),
            cache_dir: Self::default_cache_dir(),
            default_skin: Self::default_skin(),
            default_skin_path: None,
        }
    }
}

/// 图片输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// 未指定或无法解析时使用的尺寸
    #[serde(default = "ImageConfig::default_size")]
    pub default_size: u32,
    /// 尺寸下限
    #[serde(default = "ImageConfig::default_min_size")]
    pub min_size: u32,
    /// 尺寸上限
    #[serde(default = "ImageConfig::default_max_size")]
    pub max_size: u32,
    /// 并发处理许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// JPEG 质量 1-100
    #[serde(default = "ImageConfig::default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// 是否启用输出图片缓存
    #[serde(default = "ImageConfig::default_render_cache_enabled")]
    pub render_cache_enabled: bool,
    /// 输出缓存最大容量（字节），按图片字节大小加权
    #[serde(default = "ImageConfig::default_render_cache_max_bytes")]
    pub render_cache_max_bytes: u64,
    /// 输出缓存 TTL（秒）
    #[serde(default = "ImageConfig::default_render_cache_ttl")]
    pub render_cache_ttl_secs: u64,
    /// 响应头 Cache-Control 的 max-age（秒）
    #[serde(default = "ImageConfig::default_cache_control_max_age")]
    pub cache_control_max_age_secs: u64,
}

impl ImageConfig {
    fn default_size() -> u32 {
        180
    }
    fn default_min_size() -> u32 {
        16
    }
    fn default_max_size() -> u32 {
        1000
    }
    fn default_jpeg_quality() -> u8 {
        90
    }
    fn default_render_cache_enabled() -> bool {
        true
    }
    fn default_render_cache_max_bytes() -> u64 {
        64 * 1024 * 1024
    }
    fn default_render_cache_ttl() -> u64 {
        60
    }
    fn default_cache_control_max_age() -> u64 {
        172800
    }

    /// 实际生效的并发许可数
    pub fn effective_parallelism(&self) -> usize {
        if self.max_parallel == 0 {
            num_cpus::get()
        } else {
            self.max_parallel as usize
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            default_size: Self::default_size(),
            min_size: Self::default_min_size(),
            max_size: Self::default_max_size(),
            max_parallel: 0,
            jpeg_quality: Self::default_jpeg_quality(),
            render_cache_enabled: Self::default_render_cache_enabled(),
            render_cache_max_bytes: Self::default_render_cache_max_bytes(),
            render_cache_ttl_secs: Self::default_render_cache_ttl(),
            cache_control_max_age_secs: Self::default_cache_control_max_age(),
        }
    }
}

/// 缓存列表（/all）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// 每页条数
    pub page_size: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self { page_size: 85 }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// CORS 配置
    #[serde(default)]
    pub cors: CorsConfig,
    /// 皮肤源站与缓存配置
    #[serde(default)]
    pub skin: SkinConfig,
    /// 图片输出配置
    #[serde(default)]
    pub image: ImageConfig,
    /// 缓存列表配置
    #[serde(default)]
    pub listing: ListingConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::builder()
            // 配置文件可缺省，缺省时全部字段使用默认值
            .add_source(File::from(Self::config_path()).required(false))
            // 支持环境变量覆盖，例如：APP_SERVER__PORT
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<&'static AppConfig, ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        CONFIG
            .get()
            .ok_or_else(|| ConfigError::Message("配置初始化失败".to_string()))
    }

    /// 配置文件路径。加载发生在日志初始化之前，由调用方负责记录。
    pub fn config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

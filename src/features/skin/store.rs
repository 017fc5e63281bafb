//! 皮肤持久化存储
//!
//! `SkinStore` 把磁盘布局隐藏在能力接口之后：缓存策略只依赖
//! `get / put / exists / age / list`，测试可直接换成内存实现。

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SkinError;

/// 一条已缓存的皮肤
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSkin {
    /// 原始 PNG 字节
    pub bytes: Bytes,
    /// 取回时间
    pub fetched_at: DateTime<Utc>,
    /// 是否为内置默认皮肤
    pub is_default: bool,
}

impl StoredSkin {
    pub fn new(bytes: Bytes, fetched_at: DateTime<Utc>, is_default: bool) -> Self {
        Self {
            bytes,
            fetched_at,
            is_default,
        }
    }

    /// 距取回时间的时长（时钟回拨时视为 0）
    pub fn age(&self) -> Duration {
        (Utc::now() - self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// 存储 key 是否可安全用作文件名（小写玩家名：字母数字、`_`、`-`）
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 64
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

/// 皮肤存储能力。key 一律为小写玩家名。
#[async_trait]
pub trait SkinStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredSkin>, SkinError>;

    /// 写入必须原子：读者要么看到旧内容，要么看到完整的新内容。
    async fn put(&self, key: &str, skin: StoredSkin) -> Result<(), SkinError>;

    async fn exists(&self, key: &str) -> Result<bool, SkinError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn age(&self, key: &str) -> Result<Option<Duration>, SkinError> {
        Ok(self.get(key).await?.map(|s| s.age()))
    }

    /// 惰性列出当前所有已缓存的 key；每次调用都会重新扫描，可重复消费。
    fn list(&self) -> BoxStream<'static, Result<String, SkinError>>;
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemorySkinStore {
    entries: RwLock<HashMap<String, StoredSkin>>,
}

impl MemorySkinStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> SkinError {
    SkinError::Storage("内存存储锁已中毒".to_string())
}

#[async_trait]
impl SkinStore for MemorySkinStore {
    async fn get(&self, key: &str) -> Result<Option<StoredSkin>, SkinError> {
        let map = self.entries.read().map_err(|_| poisoned())?;
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, skin: StoredSkin) -> Result<(), SkinError> {
        let mut map = self.entries.write().map_err(|_| poisoned())?;
        map.insert(key.to_string(), skin);
        Ok(())
    }

    fn list(&self) -> BoxStream<'static, Result<String, SkinError>> {
        let mut keys: Vec<String> = match self.entries.read() {
            Ok(map) => map.keys().cloned().collect(),
            Err(_) => return stream::iter(vec![Err(poisoned())]).boxed(),
        };
        keys.sort();
        stream::iter(keys.into_iter().map(Ok)).boxed()
    }
}

/// sidecar 元数据（`<key>.json`）
///
/// `digest` 绑定它描述的 PNG：两次 rename 之间被读到、或 sidecar 写入失败时，
/// 摘要对不上的 sidecar 一律视为不存在。
#[derive(Debug, Serialize, Deserialize)]
struct SkinMeta {
    fetched_at: DateTime<Utc>,
    #[serde(default)]
    is_default: bool,
    #[serde(default)]
    digest: Option<String>,
}

fn digest_of(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

const SKIN_EXT: &str = "png";
const META_EXT: &str = "json";

/// 文件系统存储：每个玩家一个 `<key>.png`，外加记录取回时间的 `<key>.json`。
///
/// 缺少 sidecar（例如手工放入的皮肤文件）或 sidecar 与 PNG 不匹配时退回使用文件 mtime。
#[derive(Debug, Clone)]
pub struct FsSkinStore {
    root: PathBuf,
}

impl FsSkinStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn checked_key<'a>(&self, key: &'a str) -> Result<&'a str, SkinError> {
        if is_safe_key(key) {
            Ok(key)
        } else {
            Err(SkinError::Storage(format!("非法的存储 key: {key:?}")))
        }
    }

    fn skin_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{SKIN_EXT}"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{META_EXT}"))
    }

    async fn read_meta(&self, key: &str) -> Option<SkinMeta> {
        let raw = tokio::fs::read(self.meta_path(key)).await.ok()?;
        match serde_json::from_slice::<SkinMeta>(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(key, "皮肤元数据损坏，改用文件 mtime: {}", e);
                None
            }
        }
    }

    async fn mtime(path: &Path) -> Result<DateTime<Utc>, SkinError> {
        let modified = tokio::fs::metadata(path).await?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    /// 先写入同目录下的唯一临时文件，再 rename 覆盖目标。
    async fn write_atomic(&self, target: &Path, data: &[u8]) -> Result<(), SkinError> {
        let file_name = target
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("entry");
        let tmp = self
            .root
            .join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// 目录项是否为皮肤实体文件；是则返回其 key（标记文件、临时文件、元数据一律排除）
fn entity_key(file_name: &OsStr) -> Option<String> {
    let name = file_name.to_str()?;
    let key = name.strip_suffix(".png")?;
    is_safe_key(key).then(|| key.to_string())
}

enum ListState {
    Start(PathBuf),
    Reading(tokio::fs::ReadDir),
    Done,
}

#[async_trait]
impl SkinStore for FsSkinStore {
    async fn get(&self, key: &str) -> Result<Option<StoredSkin>, SkinError> {
        let key = self.checked_key(key)?;
        let path = self.skin_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => Bytes::from(b),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta = self
            .read_meta(key)
            .await
            .filter(|m| m.digest.as_deref() == Some(digest_of(&bytes).as_str()));
        let (fetched_at, is_default) = match meta {
            Some(meta) => (meta.fetched_at, meta.is_default),
            None => (Self::mtime(&path).await?, false),
        };
        Ok(Some(StoredSkin::new(bytes, fetched_at, is_default)))
    }

    async fn put(&self, key: &str, skin: StoredSkin) -> Result<(), SkinError> {
        let key = self.checked_key(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        self.write_atomic(&self.skin_path(key), &skin.bytes).await?;

        let meta = SkinMeta {
            fetched_at: skin.fetched_at,
            is_default: skin.is_default,
            digest: Some(digest_of(&skin.bytes)),
        };
        let raw = serde_json::to_vec(&meta)
            .map_err(|e| SkinError::Storage(format!("序列化皮肤元数据失败: {e}")))?;
        self.write_atomic(&self.meta_path(key), &raw).await
    }

    async fn exists(&self, key: &str) -> Result<bool, SkinError> {
        let key = self.checked_key(key)?;
        Ok(tokio::fs::try_exists(self.skin_path(key)).await?)
    }

    fn list(&self) -> BoxStream<'static, Result<String, SkinError>> {
        stream::unfold(ListState::Start(self.root.clone()), |state| async move {
            let mut dir = match state {
                ListState::Start(root) => match tokio::fs::read_dir(&root).await {
                    Ok(dir) => dir,
                    // 目录尚未创建：视为空缓存
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
                    Err(e) => return Some((Err(e.into()), ListState::Done)),
                },
                ListState::Reading(dir) => dir,
                ListState::Done => return None,
            };
            loop {
                match dir.next_entry().await {
                    Ok(Some(entry)) => {
                        if let Some(key) = entity_key(&entry.file_name()) {
                            return Some((Ok(key), ListState::Reading(dir)));
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => return Some((Err(e.into()), ListState::Done)),
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("minotar-store-{}", uuid::Uuid::new_v4().simple()))
    }

    fn skin(bytes: &'static [u8]) -> StoredSkin {
        StoredSkin::new(Bytes::from_static(bytes), Utc::now(), false)
    }

    #[test]
    fn safe_keys_reject_path_tricks() {
        assert!(is_safe_key("notch"));
        assert!(is_safe_key("jeb_"));
        assert!(!is_safe_key(""));
        assert!(!is_safe_key("../etc/passwd"));
        assert!(!is_safe_key("Notch"));
        assert!(!is_safe_key("a.b"));
    }

    #[test]
    fn entity_key_skips_non_skin_files() {
        assert_eq!(entity_key(OsStr::new("notch.png")), Some("notch".into()));
        assert_eq!(entity_key(OsStr::new("notch.json")), None);
        assert_eq!(entity_key(OsStr::new(".gitignore")), None);
        assert_eq!(entity_key(OsStr::new(".notch.png.abc.tmp")), None);
        assert_eq!(entity_key(OsStr::new("Thumbs.db")), None);
    }

    #[tokio::test]
    async fn memory_store_roundtrip_and_sorted_listing() {
        let store = MemorySkinStore::new();
        assert!(store.get("notch").await.unwrap().is_none());
        store.put("notch", skin(b"a")).await.unwrap();
        store.put("jeb_", skin(b"b")).await.unwrap();

        assert!(store.exists("notch").await.unwrap());
        assert!(store.age("notch").await.unwrap().is_some());
        let keys: Vec<String> = store.list().try_collect().await.unwrap();
        assert_eq!(keys, vec!["jeb_".to_string(), "notch".to_string()]);
    }

    #[tokio::test]
    async fn fs_store_persists_bytes_and_timestamp() {
        let root = temp_root();
        let store = FsSkinStore::new(&root);
        assert!(store.get("notch").await.unwrap().is_none());
        assert_eq!(store.age("notch").await.unwrap(), None);

        let old = Utc::now() - chrono::Duration::days(3);
        store
            .put("notch", StoredSkin::new(Bytes::from_static(b"png"), old, false))
            .await
            .unwrap();

        let got = store.get("notch").await.unwrap().expect("stored");
        assert_eq!(&got.bytes[..], b"png");
        assert_eq!(got.fetched_at.timestamp(), old.timestamp());
        assert!(!got.is_default);
        assert!(store.age("notch").await.unwrap().unwrap() >= Duration::from_secs(2 * 86400));

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn fs_store_overwrite_leaves_no_temp_files() {
        let root = temp_root();
        let store = FsSkinStore::new(&root);
        store.put("notch", skin(b"one")).await.unwrap();
        store.put("notch", skin(b"two")).await.unwrap();

        let got = store.get("notch").await.unwrap().unwrap();
        assert_eq!(&got.bytes[..], b"two");
        let leftovers = std::fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn fs_store_listing_is_restartable_and_excludes_markers() {
        let root = temp_root();
        let store = FsSkinStore::new(&root);

        let empty: Vec<String> = store.list().try_collect().await.unwrap();
        assert!(empty.is_empty());

        store.put("notch", skin(b"a")).await.unwrap();
        store.put("char", skin(b"b")).await.unwrap();
        std::fs::write(root.join(".gitignore"), b"*").unwrap();

        let mut first: Vec<String> = store.list().try_collect().await.unwrap();
        let mut second: Vec<String> = store.list().try_collect().await.unwrap();
        first.sort();
        second.sort();
        assert_eq!(first, vec!["char".to_string(), "notch".to_string()]);
        assert_eq!(first, second);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn fs_store_ignores_sidecar_of_previous_bytes() {
        let root = temp_root();
        let store = FsSkinStore::new(&root);
        let old = Utc::now() - chrono::Duration::days(3);
        store
            .put("notch", StoredSkin::new(Bytes::from_static(b"old"), old, true))
            .await
            .unwrap();

        // PNG 已替换但 sidecar 仍是旧的（sidecar 写入失败或读者落在两次 rename 之间）
        std::fs::write(root.join("notch.png"), b"new").unwrap();

        let got = store.get("notch").await.unwrap().expect("present");
        assert_eq!(&got.bytes[..], b"new");
        assert!(got.age() < Duration::from_secs(60));
        assert!(!got.is_default);
        assert!(store.age("notch").await.unwrap().unwrap() < Duration::from_secs(60));

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn fs_store_falls_back_to_mtime_without_sidecar() {
        let root = temp_root();
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("steve.png"), b"raw").unwrap();

        let store = FsSkinStore::new(&root);
        let got = store.get("steve").await.unwrap().expect("present");
        assert!(got.age() < Duration::from_secs(60));
        assert!(!got.is_default);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn fs_store_rejects_unsafe_keys() {
        let store = FsSkinStore::new(temp_root());
        let err = store.get("../secret").await.unwrap_err();
        assert!(matches!(err, SkinError::Storage(_)));
    }
}

//! 玩家皮肤：源站拉取、持久化缓存、区域截取与渲染。

pub mod cache;
pub mod compositor;
pub mod handler;
pub mod origin;
pub mod resolver;
pub mod store;
pub mod types;

pub use cache::{ResolvedSkin, SkinCache};
pub use handler::create_skin_router;
pub use origin::{HttpSkinOrigin, SkinOrigin};
pub use resolver::{Rendered, Resolver};
pub use store::{FsSkinStore, MemorySkinStore, SkinStore, StoredSkin};
pub use types::{OutputFormat, SizeBounds, SkinKind};

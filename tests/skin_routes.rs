use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{Request, StatusCode, header},
};
use image::{ImageFormat, Rgba, RgbaImage};
use tower::ServiceExt;

use minotar_backend::config::{AppConfig, ImageConfig};
use minotar_backend::error::SkinError;
use minotar_backend::features::skin::{
    FsSkinStore, MemorySkinStore, Resolver, SkinCache, SkinOrigin, SkinStore,
};
use minotar_backend::features::stats::SkinStats;
use minotar_backend::state::AppState;

/// 计数的内存源站
#[derive(Default)]
struct CountingOrigin {
    skins: Mutex<HashMap<String, Bytes>>,
    calls: AtomicUsize,
}

impl CountingOrigin {
    fn insert(&self, name: &str, bytes: Vec<u8>) {
        self.skins
            .lock()
            .unwrap()
            .insert(name.to_string(), Bytes::from(bytes));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SkinOrigin for CountingOrigin {
    async fn fetch(&self, name: &str) -> Result<Bytes, SkinError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.skins
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or(SkinError::OriginNotFound)
    }
}

/// 头部区域填充 `face` 颜色的 64×64 皮肤
fn skin_png(face: Rgba<u8>) -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 0]));
    for y in 8..16 {
        for x in 8..16 {
            img.put_pixel(x, y, face);
        }
    }
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

struct Harness {
    app: Router,
    origin: Arc<CountingOrigin>,
    store: Arc<dyn SkinStore>,
    stats: Arc<SkinStats>,
}

fn harness_with_store(store: Arc<dyn SkinStore>) -> Harness {
    let origin = Arc::new(CountingOrigin::default());
    origin.insert("char", skin_png(GREEN));
    origin.insert("Notch", skin_png(BLUE));

    let stats = Arc::new(SkinStats::new());
    let cache = Arc::new(SkinCache::new(
        store.clone(),
        origin.clone(),
        Duration::from_secs(86400),
        "char",
        stats.clone(),
    ));
    let config = AppConfig {
        image: ImageConfig {
            max_parallel: 2,
            ..ImageConfig::default()
        },
        ..AppConfig::default()
    };
    let resolver = Arc::new(Resolver::new(cache, &config.image, stats.clone()));
    let state = AppState::new(resolver, stats.clone(), &config);
    Harness {
        app: minotar_backend::build_router(state, &config.cors),
        origin,
        store,
        stats,
    }
}

fn harness() -> Harness {
    harness_with_store(Arc::new(MemorySkinStore::new()))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

async fn body_bytes(resp: axum::response::Response) -> Bytes {
    to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body")
}

fn header_str<'a>(resp: &'a axum::response::Response, name: &str) -> &'a str {
    resp.headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .expect("header to str")
}

#[tokio::test]
async fn avatar_renders_head_at_requested_size() {
    let h = harness();
    let resp = h.app.clone().oneshot(get("/avatar/Notch/64")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header_str(&resp, "content-type"), "image/png");
    assert_eq!(header_str(&resp, "x-requested"), "head");
    assert_eq!(header_str(&resp, "x-result"), "ok");
    assert!(header_str(&resp, "cache-control").starts_with("public, max-age="));

    let img = image::load_from_memory(&body_bytes(resp).await)
        .unwrap()
        .to_rgba8();
    assert_eq!(img.dimensions(), (64, 64));
    assert_eq!(*img.get_pixel(10, 10), BLUE);
}

#[tokio::test]
async fn unknown_player_gets_404_with_default_image() {
    let h = harness();
    let resp = h.app.clone().oneshot(get("/helm/Nobody/32")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_str(&resp, "x-result"), "notfound");
    assert_eq!(header_str(&resp, "content-type"), "image/png");
    let img = image::load_from_memory(&body_bytes(resp).await)
        .unwrap()
        .to_rgba8();
    assert_eq!(*img.get_pixel(0, 0), GREEN);
    assert_eq!(h.stats.snapshot().default_substitutions, 1);
}

#[tokio::test]
async fn size_is_clamped_and_format_negotiated() {
    let h = harness();

    let resp = h.app.clone().oneshot(get("/head/Notch/5")).await.unwrap();
    let img = image::load_from_memory(&body_bytes(resp).await).unwrap();
    assert_eq!((img.width(), img.height()), (16, 16));

    let resp = h.app.clone().oneshot(get("/head/Notch/abc")).await.unwrap();
    let img = image::load_from_memory(&body_bytes(resp).await).unwrap();
    assert_eq!((img.width(), img.height()), (180, 180));

    let resp = h.app.clone().oneshot(get("/helm/Notch/100.jpg")).await.unwrap();
    assert_eq!(header_str(&resp, "content-type"), "image/jpeg");

    let resp = h.app.clone().oneshot(get("/avatar/Notch.jpg")).await.unwrap();
    assert_eq!(header_str(&resp, "content-type"), "image/jpeg");
}

#[tokio::test]
async fn lookups_are_case_insensitive_and_cached() {
    let h = harness();
    let mut bodies = Vec::new();
    for uri in ["/avatar/Notch/64", "/avatar/NOTCH/64", "/avatar/notch/64"] {
        let resp = h.app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        bodies.push(body_bytes(resp).await);
    }
    assert!(bodies.iter().all(|b| *b == bodies[0]));

    for uri in ["/helm/notch/40", "/body/Notch"] {
        let resp = h.app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
    }
    assert_eq!(h.origin.calls(), 1);
}

#[tokio::test]
async fn lowercase_miss_does_not_hide_mixed_case_player() {
    let h = harness();

    // 源站只认 `Notch`，小写请求先落空并拿到默认皮肤
    let resp = h.app.clone().oneshot(get("/avatar/notch/64")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let substituted = body_bytes(resp).await;

    let resp = h.app.clone().oneshot(get("/avatar/Notch/64")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header_str(&resp, "x-result"), "ok");
    let hit = body_bytes(resp).await;
    assert_ne!(hit, substituted);
    let img = image::load_from_memory(&hit).unwrap().to_rgba8();
    assert_eq!(*img.get_pixel(10, 10), BLUE);

    // 此后各种大小写都命中同一份皮肤
    let resp = h.app.clone().oneshot(get("/avatar/notch/64")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, hit);
    assert_eq!(h.origin.calls(), 3);
}

#[tokio::test]
async fn matching_etag_yields_304() {
    let h = harness();
    let resp = h.app.clone().oneshot(get("/avatar/Notch/50")).await.unwrap();
    let etag = header_str(&resp, "etag").to_string();

    let req = Request::builder()
        .uri("/avatar/Notch/50")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn refresh_redirects_and_refetches() {
    let h = harness();
    h.app.clone().oneshot(get("/avatar/Notch")).await.unwrap();
    assert_eq!(h.origin.calls(), 1);

    let resp = h.app.clone().oneshot(get("/refresh/Notch")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(header_str(&resp, "location"), "/avatar/Notch");
    assert_eq!(h.origin.calls(), 2);

    h.app.clone().oneshot(get("/avatar/Notch")).await.unwrap();
    assert_eq!(h.origin.calls(), 2);
}

#[tokio::test]
async fn refresh_of_unknown_player_is_bad_gateway() {
    let h = harness();
    let resp = h.app.clone().oneshot(get("/refresh/Ghost")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(header_str(&resp, "content-type"), "application/problem+json");
    assert!(!h.store.exists("ghost").await.unwrap());
}

#[tokio::test]
async fn download_serves_raw_skin_as_attachment() {
    let h = harness();
    let resp = h.app.clone().oneshot(get("/download/Notch")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        header_str(&resp, "content-disposition"),
        "attachment; filename=\"notch.png\""
    );
    assert_eq!(body_bytes(resp).await.as_ref(), skin_png(BLUE).as_slice());
}

#[tokio::test]
async fn random_requires_a_cached_skin() {
    let h = harness();
    let resp = h.app.clone().oneshot(get("/random")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_str(&resp, "content-type"), "application/problem+json");

    h.app.clone().oneshot(get("/avatar/Notch")).await.unwrap();
    let resp = h.app.clone().oneshot(get("/random/48")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header_str(&resp, "cache-control"), "no-cache, must-revalidate");
    let img = image::load_from_memory(&body_bytes(resp).await).unwrap();
    assert_eq!((img.width(), img.height()), (48, 48));
}

#[tokio::test]
async fn all_listing_pages_sorted_names() {
    let h = harness();
    h.app.clone().oneshot(get("/avatar/Notch")).await.unwrap();
    h.app.clone().oneshot(get("/avatar/Missing")).await.unwrap();

    let resp = h.app.clone().oneshot(get("/all/head")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let page: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(page["type"], "head");
    assert_eq!(page["start"], 0);
    assert_eq!(page["limit"], 85);
    assert_eq!(page["total"], 2);
    assert_eq!(page["usernames"], serde_json::json!(["char", "notch"]));

    let resp = h.app.clone().oneshot(get("/all/helm/1")).await.unwrap();
    let page: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(page["usernames"], serde_json::json!(["notch"]));

    let resp = h.app.clone().oneshot(get("/all/cube")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_reflect_traffic() {
    let h = harness();
    h.app.clone().oneshot(get("/avatar/Notch")).await.unwrap();
    h.app.clone().oneshot(get("/helm/Notch")).await.unwrap();
    h.app.clone().oneshot(get("/player/Notch")).await.unwrap();

    let resp = h.app.clone().oneshot(get("/stats")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(v["requested"]["head"], 1);
    assert_eq!(v["requested"]["helm"], 1);
    assert_eq!(v["requested"]["body"], 1);
    assert_eq!(v["origin"]["fetches"], 1);
    assert_eq!(v["cache"]["fresh"], 2);
}

#[tokio::test]
async fn health_reports_service_name() {
    let h = harness();
    let resp = h.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(v["status"], "healthy");
    assert_eq!(v["service"], "minotar-backend");
}

#[tokio::test]
async fn filesystem_store_persists_across_harnesses() {
    let dir = std::env::temp_dir().join(format!("minotar-routes-{}", uuid::Uuid::new_v4()));

    let first = harness_with_store(Arc::new(FsSkinStore::new(&dir)));
    let resp = first.app.clone().oneshot(get("/avatar/Notch")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(dir.join("notch.png").is_file());
    assert!(dir.join("notch.json").is_file());

    let second = harness_with_store(Arc::new(FsSkinStore::new(&dir)));
    let resp = second.app.clone().oneshot(get("/avatar/notch")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(second.origin.calls(), 0);

    let _ = std::fs::remove_dir_all(dir);
}

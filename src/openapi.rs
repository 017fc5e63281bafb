use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::skin::handler::get_image,
        crate::features::skin::handler::get_image_sized,
        crate::features::skin::handler::download_skin,
        crate::features::skin::handler::refresh_skin,
        crate::features::skin::handler::get_random,
        crate::features::skin::handler::get_random_sized,
        crate::features::skin::handler::list_all,
        crate::features::stats::handler::get_stats,
    ),
    components(
        schemas(
            crate::error::AppError,
            crate::error::SkinError,
            crate::error::ProblemDetails,
            crate::features::health::handler::HealthResponse,
            crate::features::skin::types::SkinKind,
            crate::features::skin::handler::ListingPage,
            crate::features::stats::StatsSnapshot,
            crate::features::stats::RequestedCounts,
            crate::features::stats::CacheCounts,
            crate::features::stats::OriginCounts,
        )
    ),
    tags(
        (name = "Skin", description = "Skin / avatar APIs"),
        (name = "Stats", description = "Stats APIs"),
        (name = "Health", description = "Health APIs"),
    ),
    info(
        title = "Minotar Backend API",
        version = "0.1.0",
        description = "Minecraft avatar & skin service (Axum)"
    )
)]
pub struct ApiDoc;

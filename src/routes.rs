use crate::{
    api::{attendance, dashboard, regularization},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::web;

pub type RateLimit = GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware>;

/// Built once at startup; every worker's `Governor` shares its limiter state.
pub fn rate_limit(requests_per_min: u32) -> anyhow::Result<RateLimit> {
    let burst = requests_per_min.max(1);
    let per_ms = 60_000 / u64::from(burst);
    GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit: {requests_per_min} per minute"))
}

/// Attendance routes without prefix or rate limiting.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/schools/{school_id}/attendance")
            // /attendance
            .service(
                web::resource("")
                    .route(web::post().to(attendance::capture_attendance))
                    .route(web::get().to(attendance::find_attendance)),
            )
            .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
            .service(web::resource("/check-out").route(web::post().to(attendance::check_out)))
            // /attendance/regularization
            .service(
                web::resource("/regularization")
                    .route(web::put().to(regularization::request_regularization))
                    .route(web::get().to(regularization::list_regularizations))
                    .route(web::post().to(regularization::process_approvals)),
            )
            .service(web::resource("/dashboard").route(web::get().to(dashboard::dashboard)))
            .service(web::resource("/streak/{user_id}").route(web::get().to(dashboard::streak)))
            // recalculate must be registered before /stats/{user_id}
            .service(
                web::resource("/stats/recalculate").route(web::post().to(dashboard::recalculate)),
            )
            .service(
                web::resource("/stats/{user_id}").route(web::get().to(dashboard::user_stats)),
            ),
    );
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limits: &RateLimit) {
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(Governor::new(limits)) // rate limiting
            .configure(configure_api),
    );
}

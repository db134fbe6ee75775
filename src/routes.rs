use crate::{
    api::{attendance, groups, payments, students},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond((60_000 / u64::from(requests_per_min)).max(1))
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap_or_default();
        Governor::new(&cfg)
    }

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/groups")
                    // /groups/{id}/attendance/...
                    .service(attendance::scope())
                    // /groups
                    .service(
                        web::resource("")
                            .route(web::get().to(groups::list_groups))
                            .route(web::post().to(groups::create_group)),
                    )
                    // /groups/slots, ahead of /{id}
                    .service(web::resource("/slots").route(web::get().to(groups::slots)))
                    // /groups/{id}
                    .service(
                        web::resource("/{group_id}")
                            .route(web::get().to(groups::group_details))
                            .route(web::put().to(groups::update_group))
                            .route(web::delete().to(groups::delete_group)),
                    ),
            )
            .service(
                web::scope("/students").service(
                    web::resource("/{student_id}").route(web::get().to(students::get_student)),
                ),
            )
            .service(
                web::scope("/payments").service(
                    web::resource("/receipt").route(web::post().to(payments::receipt)),
                ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ATTENDANCE
//  └─ edit → toggle… → save | cancel

pub mod discovery;
pub mod resources;

use actix_web::web;

/// Gateway listener routes. The resource catch-all is registered as the
/// app's default service by the caller.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/discover/resources",
        web::get().to(discovery::discover),
    );
}

// Route exports
pub mod matches;

use actix_web::web;

pub use matches::{match_error_response, AppState};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(matches::configure),
    );
}

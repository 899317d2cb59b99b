//! HTTP adapter: axum routes, handlers, and DTOs.

mod dto;
mod handlers;
mod routes;

pub use handlers::AppState;
pub use routes::app_routes;

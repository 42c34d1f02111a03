//! HTTP API.
//!
//! Success bodies are `{ "data": ... }`; failures are `{ "error", "code" }`
//! with the status chosen by [`AppError`].

pub mod app;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod state;

pub use app::build_router;
pub use error::{AppError, AppResult, ErrorResponse};
pub use extract::{AdminUser, ApiJson, ApiPath, ApiQuery, AuthUser};
pub use state::AppState;

//! HTTP front for the recognition and lyrics pages.

mod error;
mod handlers;
mod server;

pub use error::ApiError;
pub use handlers::{create_router, AppState};
pub use server::HttpServer;

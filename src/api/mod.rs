pub mod handlers;
pub mod routes;
pub mod stats;

pub use handlers::{ApiError, AppState, ErrorResponse};
pub use routes::create_api_router;

mod api;

pub use api::{AllowlistStatus, HealthResponse};

mod health;
mod protected;

pub use health::{health_check, readiness_check};
pub use protected::index;

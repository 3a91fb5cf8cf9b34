pub mod auth;

pub use auth::{RequireCronSecret, RequireKeyAuth};

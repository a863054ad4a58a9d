//! candela-server
//!
//! HTTP publication layer for a Candela data directory, plus the bootstrap steps
//! the binary runs before starting the synchronizer (directory creation, cleanup of
//! unconfigured files, environment configuration).

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;

//! candela-middleware
//!
//! Wrappers layered around an [`ExchangeClient`](candela_core::ExchangeClient) and a
//! builder to compose them.

mod builder;
mod quota;

pub use crate::builder::ClientBuilder;
pub use crate::quota::{QuotaAwareClient, QuotaMiddleware};

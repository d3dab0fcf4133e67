//! # athena-router
//!
//! The query router: classifies intent, fans out to the layer stores
//! through their capability trait, renormalises and merges scores, and
//! carries the request-surface plumbing (operation registry, rate limits,
//! pagination cursors).

pub mod intent;
pub mod limiter;
pub mod operations;
pub mod pagination;
pub mod router;

pub use intent::{classify, Intent};
pub use limiter::RateLimiter;
pub use operations::{OperationSpec, Registry};
pub use pagination::Cursor;
pub use router::{QueryRouter, RoutedQuery, RoutedResult};

//! HTTP API handlers

pub mod cache;
pub mod categories;
pub mod health;
pub mod root;
pub mod sse;
pub mod trends;

pub use cache::cache_routes;
pub use categories::category_routes;
pub use health::health_routes;
pub use root::root_routes;
pub use sse::event_stream;
pub use trends::trend_routes;

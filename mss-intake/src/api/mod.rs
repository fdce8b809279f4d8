//! HTTP API handlers for mss-intake

pub mod events;
pub mod health;
pub mod placeholders;
pub mod session;

pub use events::event_stream;
pub use health::health_routes;
pub use placeholders::placeholder_routes;
pub use session::{SessionContext, TENANT_HEADER};

//! Inbound HTTP surface: path-based dispatch to the Placer and request-id
//! stamping (spec §4.8, §6).

pub mod auth;
pub mod frontend;
pub mod request_id;

pub use frontend::{router, RoutingState};

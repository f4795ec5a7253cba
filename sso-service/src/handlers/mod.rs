//! HTTP handlers for sso-service.

pub mod metrics;
pub mod register;

pub use register::register;

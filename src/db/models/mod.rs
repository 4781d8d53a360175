//! Database models split into domain-specific modules.

pub mod booking;
pub mod service;
pub mod user;
pub mod vehicle;

pub use booking::*;
pub use service::*;
pub use user::*;
pub use vehicle::*;

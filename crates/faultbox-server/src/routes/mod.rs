//! HTTP route handlers.

pub mod faults;
pub mod users;

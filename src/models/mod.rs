//! Data models for the store directory.

mod review;
mod store;
mod user;

pub use review::*;
pub use store::*;
pub use user::*;

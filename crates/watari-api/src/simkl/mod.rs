pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use client::{ActivityFetch, SimklClient};
pub use error::SimklError;

//! Client for the moderation REST surface.

pub mod client;
pub mod error;
pub mod logs;
pub mod moderation;
pub mod search;

pub use client::ApiClient;
pub use error::ApiError;

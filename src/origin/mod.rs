//! Upstream repository client

pub mod client;
pub mod errors;

pub use client::OriginClient;
pub use errors::OriginError;

//! Request/response model and network access.

mod client;
mod types;

pub use client::{HttpNetwork, Network};
pub use types::{Request, RequestMode, Response, ResponseType};

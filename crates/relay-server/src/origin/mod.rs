//! Upstream API client.

mod budget;
mod http;

pub use budget::CallBudget;
pub use http::HttpOrigin;

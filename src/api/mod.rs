pub mod client;
pub mod submit;
pub mod types;

pub use client::ApiClient;
pub use types::{SubmitData, SubmitResponse};

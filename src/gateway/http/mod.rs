//! HTTP implementation of the exam gateway, talking JSON to the exam API.

mod client;
mod config;
mod error;
mod models;

pub use client::HttpExamGateway;
pub use config::HttpGatewayConfig;
pub use error::{HttpGatewayError, HttpResult};

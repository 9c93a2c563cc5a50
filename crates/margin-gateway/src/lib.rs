//! # margin-gateway
//!
//! Concrete collaborators for margin: the notes REST API, the image host
//! and an in-memory gateway for tests and offline use.

pub mod image_host;
pub mod memory;
pub mod rest;

pub use image_host::ImageHostUploader;
pub use memory::{GatewayCall, MemoryGateway, Operation};
pub use rest::RestGateway;

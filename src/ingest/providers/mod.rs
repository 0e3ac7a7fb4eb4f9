// src/ingest/providers/mod.rs
pub mod x_api;

pub use x_api::XApiProvider;

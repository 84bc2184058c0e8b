// src/conclave/clients/mod.rs
pub mod azure;
pub mod common;
pub mod gemini;
pub mod http_pool;
pub mod ollama;
pub mod openai;

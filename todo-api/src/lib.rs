//! # Todo API Server Library
//!
//! HTTP layer of the todo backend: routing, middleware, request validation
//! and the `{code, msg, data}` envelope.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Validating JSON extractor
//! - `middleware`: CORS/origin guard and rate limiting
//! - `response`: Success envelope and result codes
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod response;
pub mod routes;

//! # MakrX API Server Library
//!
//! HTTP surface for the MakrX platform: MakrCave makerspace management,
//! MakrX Events, the service marketplace and the MakrX Store.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod routes;

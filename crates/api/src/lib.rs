//! HTTP API: router, request/response mapping and caller context.

pub mod app;
pub mod context;
pub mod middleware;

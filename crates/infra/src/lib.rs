//! Infrastructure layer: storage, blobs, configuration, file ingestion,
//! the WFM client and the domain handlers built on top of them.

pub mod blob;
pub mod config;
pub mod ingest;
pub mod repository;
pub mod retry;
pub mod services;
pub mod store;
pub mod wfm;

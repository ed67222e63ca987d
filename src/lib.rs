pub mod app;
pub mod auditlog;
pub mod callflow;
pub mod config;
pub mod directory;
pub mod error;
pub mod handler;
pub mod models;
pub mod notify;
pub mod version;

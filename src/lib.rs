pub mod api;
pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pagination;
pub mod storage;

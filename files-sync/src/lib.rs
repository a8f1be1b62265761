pub mod actions;
pub mod cache;
pub mod config;
pub mod logging;
pub mod notify;
pub mod upload;

pub mod cache;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod fs;
pub mod metadata;
pub mod models;
pub mod notify;
pub mod paths;
pub mod stability;
pub mod system;

pub mod app;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod http;
pub mod logging;
pub mod store;
pub mod summarize;
pub mod utils;
pub mod watcher;

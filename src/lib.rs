pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod listing;
pub mod logging;
pub mod utils;

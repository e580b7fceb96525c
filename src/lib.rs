pub mod assets;
pub mod config;
pub mod data;
pub mod filter;
pub mod logging;
pub mod present;
pub mod server;
pub mod stats;
pub mod store;

pub mod config;
pub mod daemon;
pub mod device;
pub mod enrich;
pub mod errors;
pub mod history;
pub mod item;
pub mod monitor;
pub mod queue;
pub mod search;
pub mod store;

pub mod config;
pub mod countries;
pub mod stats;
pub mod watch;

pub mod accounts;
pub mod banner;
pub mod client;
pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod events;

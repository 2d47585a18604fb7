pub mod config;
pub mod handlers;
pub mod proxy;
pub mod token;

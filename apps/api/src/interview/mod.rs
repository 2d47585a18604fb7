pub mod handlers;
pub mod models;
pub mod position;
pub mod prompts;

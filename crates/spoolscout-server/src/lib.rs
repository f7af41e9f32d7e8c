pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod routes;
pub mod search;
pub mod security;
pub mod state;
pub mod store;

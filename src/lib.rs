pub mod collector;
pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod drainer;
pub mod models;
pub mod prices_api;
pub mod queue;
mod retry;
pub mod sink;
pub mod source;

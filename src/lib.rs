pub mod config;
pub mod error;
pub mod model;
pub mod providers;

pub mod database;
pub mod server;
pub mod services;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod sample_data;

pub use connection::*;
pub use entities::*;

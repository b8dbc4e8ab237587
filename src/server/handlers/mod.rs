pub mod assets;
pub mod health;
pub mod sample;
pub mod scans;
pub mod trends;

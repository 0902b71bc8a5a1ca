pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod practice;
pub mod server;
pub mod storage;

pub mod config;
pub mod error;
pub mod history;
pub mod manager;
pub mod model;
pub mod storage;

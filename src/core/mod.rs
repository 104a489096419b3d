pub mod cache;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod mention;
pub mod model;
pub mod service;
pub mod storage;
pub mod sweeper;

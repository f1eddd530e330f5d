pub mod assembler;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod forecast;
pub mod notifier;
pub mod rainfall;
pub mod scheduler;
pub mod service;
pub mod summary;
pub mod timestamp;
pub mod training;
pub mod worker;

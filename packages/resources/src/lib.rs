pub mod cache;
pub mod catalog;
pub mod config;
pub mod database;
pub mod derivation;
pub mod entity;
pub mod error;
pub mod placeholder;
pub mod registry;
pub mod seed;
pub mod state;
pub mod transcode;

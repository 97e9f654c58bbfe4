pub mod error;
pub mod config;
pub mod sql;
pub mod sec;
pub mod user;
pub mod storage;
pub mod account;
pub mod state;
pub mod jobs;

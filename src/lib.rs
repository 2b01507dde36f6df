//! Guilds Store - guild membership persistence
//!
//! Stores guilds, their members and periodic portfolio snapshots in MongoDB
//! or SQLite, keeping each guild's member counter within its capacity and
//! every address in at most one guild.

pub mod config;
pub mod model;
pub mod storage;
pub mod utils;

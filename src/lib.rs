//! DEALHAWK — Marketplace price monitor and automated purchase agent
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod marketplace;
pub mod observer;
pub mod ops;
pub mod monitor;

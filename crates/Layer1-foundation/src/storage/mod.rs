//! Storage module for Relay
//!
//! - `json`: JSON files with atomic replace, used for task records, index
//!   files and configuration

mod json;

pub use json::JsonStore;

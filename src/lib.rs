//! forumwatch - scheduled forum automation
//!
//! Watches a forum's pending invite reviews and performs a daily check-in on
//! another. This library crate exposes internal modules for integration testing.

pub mod config;
pub mod data;
pub mod differ;
pub mod error;
pub mod integrations;
pub mod jobs;
pub mod notify;
pub mod retry;
pub mod scheduler;
pub mod store;

//! Agent Log Tail - per-agent JSONL status log tailing.

pub mod config;
pub mod display;
pub mod watcher;

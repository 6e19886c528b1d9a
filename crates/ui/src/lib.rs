#![deny(unsafe_code)]

/// Terminal host driving the chat agent.
pub mod app;
/// In-memory page the agent's actions land on.
pub mod page;
/// Settings persistence.
pub mod settings;

// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Collaborators of the dispatch engine
pub mod mail;
pub mod store;
pub mod template;

// Domain layer
pub mod notification;

// Supporting modules
pub mod tasks;

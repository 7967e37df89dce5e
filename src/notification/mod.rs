//! Notification records, background e-mail delivery and read-side queries.
//!
//! `NotificationEngine` persists records and spawns one delivery task per
//! record. `NotificationQueryService` serves recipient-scoped reads from the
//! same store.

pub mod delivery;
mod engine;
mod query;
mod types;

pub use delivery::{DeliveryError, DeliveryOutcome};
pub use engine::{EngineStats, EngineStatsSnapshot, NotificationEngine};
pub use query::NotificationQueryService;
pub use types::{
    NewNotification, Notification, NotificationCounts, NotificationStatus, ParseStatusError,
};

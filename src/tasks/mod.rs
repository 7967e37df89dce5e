//! Background tasks

mod purge;

pub use purge::PurgeTask;

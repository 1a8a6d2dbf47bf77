//! Domain types and models

pub mod entity;
pub mod push;
pub mod record;
pub mod stats;

pub use entity::{EntityKind, EntitySpec, Relationship};
pub use push::PushNotification;
pub use record::{Payload, Record};
pub use stats::{KindSweepStats, SweepReport};

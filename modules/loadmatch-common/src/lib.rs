pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{BusConfig, Config};
pub use error::LoadmatchError;
pub use events::{DomainEvent, Envelope, EventType};
pub use types::*;

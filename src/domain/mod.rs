//! Domain layer - Core types with no knowledge of transports or plugins
//! 
//! This layer contains:
//! - Entities: Events, senders and outbound actions
//! - Traits: Boundaries to the event source and the configuration store

pub mod entities;
pub mod traits;

//! Application layer - Use cases and business logic
//! 
//! This layer contains:
//! - Errors: Error types for every layer
//! - Messaging: The in-process event source and command parsing

pub mod errors;
pub mod messaging;

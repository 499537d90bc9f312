//! Adapters - Front ends that feed events into the host

pub mod console;

pub use console::ConsoleAdapter;

pub mod classify;
pub mod engine;
pub mod groups;
pub mod resolve;
pub mod types;

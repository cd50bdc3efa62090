//! Shared types for the grasp engine: ids, configs, transcript events,
//! model decisions and the traits at the external boundaries.

pub mod chat;
pub mod config;
pub mod decision;
pub mod errors;
pub mod ids;
pub mod invoker;
pub mod template;
pub mod transcript;
pub mod validate;

//! Application services: the feed registry and its error mapping.

pub mod catalog;
pub mod error;
pub mod registry;

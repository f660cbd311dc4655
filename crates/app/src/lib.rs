//! Promotion engine services, persistence contract and wiring.

pub mod clock;
pub mod context;
pub mod domain;
pub mod fixtures;
mod guard;
pub mod pagination;
pub mod reaper;
pub mod settings;
pub mod store;

#[cfg(test)]
mod test;

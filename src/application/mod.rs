//! Use cases, repository traits and the catalog facade.

pub mod catalog;
pub mod categories;
pub mod error;
#[cfg(test)]
pub(crate) mod fakes;
pub mod filter;
pub mod products;
pub mod repos;

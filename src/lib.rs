//! Commerce Query Gateway Library
//!
//! Turns a short natural-language request plus a set of storefront platforms
//! into a validated, parameterized BigQuery statement, driven entirely by
//! schema metadata.

pub mod backend;
pub mod config;
pub mod error;
pub mod registry;
pub mod router;
pub mod security;
pub mod service;
pub mod sql;

#[cfg(test)]
pub(crate) mod test_support;

//! Catalog agent HTTP surface and configuration, shared by the binary and
//! its integration tests.

pub mod api;
pub mod config;

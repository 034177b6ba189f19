//! CLI command implementations.
//!
//! - [`run`] - Create, dispatch and watch one job
//! - [`config`] - Show the resolved scheduler configuration

pub mod common;
pub mod config;
pub mod run;

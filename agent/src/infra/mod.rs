//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: HTTP calls to the catalog and
//! artifact hosts, filesystem access, and process execution.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod catalog;
pub mod command_runner;
pub mod config;
pub mod download;
pub mod fs;
pub mod health;
pub mod snapshot;
pub mod state;
pub mod supervisor;

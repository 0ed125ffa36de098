//! Unit tests for update-agent
//!
//! These tests use mocked ports and run fast without external I/O.

mod rollback_service;
mod update_service;

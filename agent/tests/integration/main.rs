//! Integration tests for update-agent
//!
//! These tests talk to a local HTTP server or spawn the actual binary.
//! They are slower and should be run separately from unit tests.

mod http;

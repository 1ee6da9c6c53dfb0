//! Integration test suite for the Monolith updater
//!
//! End-to-end tests of the update pipeline through the public library API
//! and through the `monolith` binary. Network access is either scripted with
//! the in-memory transport or served by a local HTTP server; nothing leaves
//! the machine.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **cli**: the `monolith` binary, its flags and exit codes
//! - **http**: the real HTTP transport against a local server
//! - **pipeline**: gate, download, install and outcomes per platform
//! - **recovery**: interrupted installs and rollbacks

// Local HTTP server shared by the http and cli tests
mod server;

mod cli;
mod http;
mod pipeline;
mod recovery;

//! Core types shared by every part of the updater.
//!
//! At the moment this is the error taxonomy and its user-facing rendering.
//! See [`error`] for the classification rules.

pub mod error;

pub use error::{ErrorContext, Result, UpdateError, user_friendly_error};

//! Data model and state-directory management for hermetic actions.
//!
//! This crate knows the shape of an action (inputs/outputs/timeout) and
//! the layout of the on-disk state directory, but nothing about how an
//! action is actually executed; see `kiln-actions` for that.

#![warn(missing_docs)]

pub mod action;
pub mod error;
pub mod state;

pub use self::{action::*, error::*, state::Context};

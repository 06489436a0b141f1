//! Wires `kiln-sandbox` and `kiln-util` into `kiln-core`'s data model.
//!
//! This crate knows how to populate a scratch directory's skeleton,
//! how to invoke a sandboxed command inside it, and how to collect
//! and cache the outputs it leaves behind. It is the only crate that
//! depends on all three of `kiln-core`, `kiln-sandbox`, and
//! `kiln-util` at once.

#![warn(missing_docs)]

pub use self::{perform::*, run::*};

mod perform;
mod run;

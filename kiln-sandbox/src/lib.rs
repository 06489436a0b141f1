//! A reusable builder over `clone3` for running one program
//! inside a freshly constructed Linux container.
//!
//! This crate knows nothing about actions, caching, or the layout of
//! any particular sandbox filesystem; it only knows how to bring up
//! namespaces, apply a list of mounts, `chroot`, and run a program to
//! completion or timeout.

#![warn(missing_docs)]

pub use self::{command::*, mount::*, namespaces::*, stdio::*};

mod clone_args;
mod command;
mod mount;
mod namespaces;
mod stdio;

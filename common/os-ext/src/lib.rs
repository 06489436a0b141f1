//! Extra items for talking to the operating system.
//!
//! This crate provides a safe, low-level interface to the operating system.
//! The functions in this crate are named after their underlying system calls,
//! and their behavior is identical except for the differences listed below.
//! The exact semantics of each function can be found in their man pages.
//! This is in contrast with the std crate, which gives no such guarantees.
//! This is a trade-off against cross-platform compatibility.
//!
//! # Differences with underlying system calls
//!
//! Errors are reported using [`Result`] rather than
//! through `errno` and an arbitrary return value.
//!
//! Regular string arguments are accepted instead of NUL-terminated strings.
//! They are automatically made NUL-terminated by the wrapper functions.
//! If an interior NUL is found within the string,
//! the wrapper function fails with `EINVAL`.
//!
//! When a new file descriptor is created by one of the functions,
//! it is created with the `FD_CLOEXEC` bit set (atomically).
//! That is, the `*_CLOEXEC` flag is set implicitly by the wrapper functions.
//! This ensures no resources are leaked in a threaded program that forks.
//!
//! If the system call fails with `EINTR` (interrupted),
//! the wrapper function automatically retries it.
//!
//! [`Result`]: `std::io::Result`

#![warn(missing_docs)]

pub use {
    self::{dirent_::*, fcntl::*, process::*, rename::*, stdlib::*, sys_stat::*, unistd::*},
    libc::{
        AT_SYMLINK_NOFOLLOW,
        CLONE_NEWCGROUP, CLONE_NEWIPC, CLONE_NEWNET, CLONE_NEWNS,
        CLONE_NEWPID, CLONE_NEWUSER, CLONE_NEWUTS,
        MS_BIND, MS_NODEV, MS_NOEXEC, MS_NOSUID, MS_PRIVATE, MS_RDONLY,
        MS_REC, MS_REMOUNT,
        O_CREAT, O_DIRECTORY, O_NOFOLLOW, O_PATH, O_RDONLY, O_RDWR, O_WRONLY,
        POLLIN, RENAME_NOREPLACE,
        S_IFDIR, S_IFLNK, S_IFMT, S_IFREG, S_IXUSR,
        SIGKILL,
        gid_t, pid_t, uid_t,
    },
};

pub mod io;

use std::{
    ffi::CString,
    io::{self as stdio, ErrorKind::Interrupted},
    os::unix::ffi::OsStrExt,
    path::Path,
};

mod dirent_;
mod fcntl;
mod process;
mod rename;
mod stdlib;
mod sys_stat;
mod unistd;

// Cannot `pub use` as that would also export the stat function.
#[allow(missing_docs, non_camel_case_types)]
pub type stat = libc::stat;

/// Call `f` until it no longer fails with `EINTR`.
fn retry_on_eintr<F, T>(mut f: F) -> stdio::Result<T>
    where F: FnMut() -> stdio::Result<T>
{
    loop {
        match f() {
            Err(err) if err.kind() == Interrupted => continue,
            result                                => return result,
        }
    }
}

/// Convert a path to a NUL-terminated C string.
///
/// Fails with [`InvalidInput`][`stdio::ErrorKind::InvalidInput`]
/// if the path contains an interior NUL byte.
fn path_to_cstring(path: &Path) -> stdio::Result<CString>
{
    CString::new(path.as_os_str().as_bytes())
        .map_err(|err| stdio::Error::new(stdio::ErrorKind::InvalidInput, err))
}

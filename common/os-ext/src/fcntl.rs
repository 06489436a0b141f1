use std::{
    io,
    os::unix::io::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
    path::Path,
};

use crate::path_to_cstring;

/// Equivalent to [`openat`] with [`None`] passed for `dirfd`.
pub fn open(
    pathname: &Path,
    flags: libc::c_int,
    mode: libc::mode_t,
) -> io::Result<OwnedFd>
{
    openat(None, pathname, flags, mode)
}

/// Call openat(2) with the given arguments.
///
/// If `dirfd` is [`None`], `AT_FDCWD` is passed.
pub fn openat(
    dirfd:    Option<BorrowedFd>,
    pathname: &Path,
    flags:    libc::c_int,
    mode:     libc::mode_t,
) -> io::Result<OwnedFd>
{
    let dirfd = dirfd.map(|fd| fd.as_raw_fd()).unwrap_or(libc::AT_FDCWD);
    let pathname = path_to_cstring(pathname)?;
    let flags = flags | libc::O_CLOEXEC;

    // SAFETY: path is NUL-terminated.
    let fd = unsafe { libc::openat(dirfd, pathname.as_ptr(), flags, mode) };

    if fd == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: fd is a new, open file descriptor.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Duplicate a file descriptor with `FD_CLOEXEC` set atomically.
///
/// This is the only way this crate exposes duplication of file descriptors.
/// Plain `dup` is not exposed, because it cannot set `FD_CLOEXEC` atomically.
pub fn fcntl_dupfd_cloexec(fd: BorrowedFd, minfd: libc::c_int)
    -> io::Result<OwnedFd>
{
    // SAFETY: fd is a valid, open file descriptor.
    let new_fd = unsafe {
        libc::fcntl(fd.as_raw_fd(), libc::F_DUPFD_CLOEXEC, minfd)
    };

    if new_fd == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: new_fd is a new, open file descriptor.
    Ok(unsafe { OwnedFd::from_raw_fd(new_fd) })
}

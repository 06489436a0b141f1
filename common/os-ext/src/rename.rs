use {
    crate::path_to_cstring,
    std::{io, os::unix::io::{AsRawFd, BorrowedFd}, path::Path},
};

/// Call renameat2(2) with the given arguments.
///
/// If `olddirfd` or `newdirfd` is [`None`], `AT_FDCWD` is passed.
pub fn renameat2(
    olddirfd: Option<BorrowedFd>,
    oldpath:  &Path,
    newdirfd: Option<BorrowedFd>,
    newpath:  &Path,
    flags:    libc::c_uint,
) -> io::Result<()>
{
    let olddirfd = olddirfd.map(|fd| fd.as_raw_fd()).unwrap_or(libc::AT_FDCWD);
    let newdirfd = newdirfd.map(|fd| fd.as_raw_fd()).unwrap_or(libc::AT_FDCWD);
    let oldpath = path_to_cstring(oldpath)?;
    let newpath = path_to_cstring(newpath)?;

    // SAFETY: Paths are NUL-terminated.
    let result = unsafe {
        libc::renameat2(
            olddirfd, oldpath.as_ptr(),
            newdirfd, newpath.as_ptr(),
            flags,
        )
    };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

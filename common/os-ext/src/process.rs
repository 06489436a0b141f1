use {
    crate::{path_to_cstring, retry_on_eintr},
    std::{
        io,
        os::unix::io::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
        path::Path,
    },
};

/// Call mount(2) with the given arguments.
///
/// Any of `source`, `target`, `fstype`, or `data` may be `None`,
/// matching the way mount(2) itself accepts `NULL` for these arguments.
pub fn mount(
    source: Option<&Path>,
    target: Option<&Path>,
    fstype: Option<&str>,
    flags: libc::c_ulong,
    data: Option<&str>,
) -> io::Result<()>
{
    let source = source.map(path_to_cstring).transpose()?;
    let target = target.map(path_to_cstring).transpose()?;
    let fstype = fstype.map(|s| std::ffi::CString::new(s)).transpose()?;
    let data = data.map(|s| std::ffi::CString::new(s)).transpose()?;

    let source_ptr = source.as_ref().map_or(std::ptr::null(), |s| s.as_ptr());
    let target_ptr = target.as_ref().map_or(std::ptr::null(), |s| s.as_ptr());
    let fstype_ptr = fstype.as_ref().map_or(std::ptr::null(), |s| s.as_ptr());
    let data_ptr = data.as_ref().map_or(std::ptr::null(), |s| s.as_ptr() as *const libc::c_void);

    // SAFETY: All non-null pointers are NUL-terminated and remain valid
    //         for the duration of the call.
    let result = unsafe {
        libc::mount(source_ptr, target_ptr, fstype_ptr, flags, data_ptr)
    };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call chroot(2) with the given arguments.
pub fn chroot(path: &Path) -> io::Result<()>
{
    let path = path_to_cstring(path)?;

    // SAFETY: path is NUL-terminated.
    let result = unsafe { libc::chroot(path.as_ptr()) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call chdir(2) with the given arguments.
pub fn chdir(path: &Path) -> io::Result<()>
{
    let path = path_to_cstring(path)?;

    // SAFETY: path is NUL-terminated.
    let result = unsafe { libc::chdir(path.as_ptr()) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call unshare(2) with the given arguments.
pub fn unshare(flags: libc::c_int) -> io::Result<()>
{
    // SAFETY: This is always safe.
    let result = unsafe { libc::unshare(flags) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call kill(2) with the given arguments.
pub fn kill(pid: libc::pid_t, signal: libc::c_int) -> io::Result<()>
{
    // SAFETY: This is always safe.
    let result = unsafe { libc::kill(pid, signal) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call waitpid(2) with the given arguments.
///
/// Returns the reaped pid and the raw wstatus value.
pub fn waitpid(pid: libc::pid_t, options: libc::c_int)
    -> io::Result<(libc::pid_t, libc::c_int)>
{
    retry_on_eintr(|| {
        let mut wstatus: libc::c_int = 0;

        // SAFETY: wstatus is a valid pointer to an int.
        let result = unsafe { libc::waitpid(pid, &mut wstatus, options) };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok((result, wstatus))
    })
}

/// Call pipe2(2) with the given arguments.
///
/// `O_CLOEXEC` is set implicitly, in addition to whatever is in `flags`.
pub fn pipe2(flags: libc::c_int) -> io::Result<(OwnedFd, OwnedFd)>
{
    let mut fds: [libc::c_int; 2] = [0; 2];
    let flags = flags | libc::O_CLOEXEC;

    // SAFETY: fds is a valid pointer to two ints.
    let result = unsafe { libc::pipe2(fds.as_mut_ptr(), flags) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: pipe2 initialized both file descriptors.
    let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    Ok((read_end, write_end))
}

/// Call poll(2) with the given arguments.
///
/// `timeout_ms` is interpreted as by poll(2):
/// a negative value blocks indefinitely, zero returns immediately.
///
/// Returns the number of file descriptors with nonzero revents.
pub fn poll(fds: &mut [libc::pollfd], timeout_ms: libc::c_int) -> io::Result<usize>
{
    retry_on_eintr(|| {
        // SAFETY: fds points to a valid array of the given length.
        let result = unsafe {
            libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms)
        };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(result as usize)
    })
}

/// Call read(2) with the given arguments.
pub fn read(fd: BorrowedFd, buf: &mut [u8]) -> io::Result<usize>
{
    retry_on_eintr(|| {
        // SAFETY: buf is a valid, writable buffer of the given length.
        let result = unsafe {
            libc::read(fd.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len())
        };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(result as usize)
    })
}

/// Call write(2) with the given arguments.
pub fn write(fd: BorrowedFd, buf: &[u8]) -> io::Result<usize>
{
    retry_on_eintr(|| {
        // SAFETY: buf is a valid, readable buffer of the given length.
        let result = unsafe {
            libc::write(fd.as_raw_fd(), buf.as_ptr() as *const libc::c_void, buf.len())
        };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(result as usize)
    })
}

use {
    crate::{Mount, Namespaces, Stdio, StdioDisposition, clone_args::CloneArgs},
    os_ext::io::magic_link,
    std::{
        ffi::{CStr, CString},
        fs::File,
        io::Read,
        mem::{forget, size_of_val, zeroed},
        os::unix::io::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
        ptr::{addr_of, addr_of_mut, null},
        sync::Once,
        time::Duration,
    },
};

/// Make every panic in this process abort instead of unwind.
///
/// The child branch between `clone3` and `execve` must not unwind: a
/// panic there would run arbitrary destructors and could even return
/// out of the child branch into the rest of this function, executing
/// the parent's logic twice over. There is no stable per-thread
/// equivalent of the old `panic_always_abort` feature, so this installs
/// a process-wide hook that aborts immediately; it is installed here,
/// before `clone3`, so the one allocation it requires happens in the
/// parent and is simply inherited (copy-on-write) by the child.
fn abort_on_panic()
{
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        std::panic::set_hook(Box::new(|_| std::process::abort()));
    });
}

/// Builder for one sandboxed child process.
///
/// A `Command` accumulates everything needed to spawn a process
/// inside a fresh set of Linux namespaces: the program to run, the
/// namespaces to unshare, the uid/gid mapping, the sequence of mounts
/// to apply before `chroot`, and the standard stream dispositions.
/// Nothing is performed until [`run`][`Self::run`] is called.
#[derive(Default)]
pub struct Command
{
    program: Option<CString>,
    argv: Vec<CString>,
    envp: Vec<CString>,
    namespaces: Namespaces,
    setgroups: Option<&'static str>,
    uid_map: Option<String>,
    gid_map: Option<String>,
    initial_dir: Option<OwnedFd>,
    mounts: Vec<Mount>,
    chroot: Option<CString>,
    post_chroot_chdir: Option<CString>,
    stdio: Stdio,
}

impl Command
{
    /// Start building a command that execs `program`.
    pub fn new(program: CString) -> Self
    {
        Self{program: Some(program), ..Self::default()}
    }

    /// Set the argument vector, including the conventional zeroth argument.
    pub fn argv(mut self, argv: Vec<CString>) -> Self
    {
        self.argv = argv;
        self
    }

    /// Set the environment, as `NAME=VALUE` strings.
    pub fn envp(mut self, envp: Vec<CString>) -> Self
    {
        self.envp = envp;
        self
    }

    /// Set which namespaces to unshare.
    pub fn namespaces(mut self, namespaces: Namespaces) -> Self
    {
        self.namespaces = namespaces;
        self
    }

    /// Configure the user namespace's uid/gid mapping.
    ///
    /// `outer_uid`/`outer_gid` map to uid/gid 0 inside the container.
    pub fn map_root_to(mut self, outer_uid: libc::uid_t, outer_gid: libc::gid_t) -> Self
    {
        self.setgroups = Some("deny\n");
        self.uid_map = Some(format!("0 {outer_uid} 1\n"));
        self.gid_map = Some(format!("0 {outer_gid} 1\n"));
        self
    }

    /// Set the initial working directory, by file descriptor.
    ///
    /// The descriptor is resolved to a path in the parent (see the
    /// design note on `/proc/self/fd` indirection) and the child
    /// `chdir`s to that path before applying any mounts.
    pub fn initial_dir(mut self, dir: OwnedFd) -> Self
    {
        self.initial_dir = Some(dir);
        self
    }

    /// Append one mount operation to the ordered mount list.
    pub fn mount(mut self, mount: Mount) -> Self
    {
        self.mounts.push(mount);
        self
    }

    /// Append several mount operations to the ordered mount list.
    pub fn mounts(mut self, mounts: impl IntoIterator<Item = Mount>) -> Self
    {
        self.mounts.extend(mounts);
        self
    }

    /// Set the path to `chroot` into, after all mounts have been applied.
    pub fn chroot(mut self, path: CString) -> Self
    {
        self.chroot = Some(path);
        self
    }

    /// Set the path to `chdir` into, after `chroot`.
    pub fn post_chroot_chdir(mut self, path: CString) -> Self
    {
        self.post_chroot_chdir = Some(path);
        self
    }

    /// Set the dispositions of the standard streams.
    pub fn stdio(mut self, stdio: Stdio) -> Self
    {
        self.stdio = stdio;
        self
    }

    /// Spawn the child and wait for it to finish, up to `timeout`.
    ///
    /// Returns once the child has exited successfully, been terminated
    /// abnormally, exceeded the timeout, or failed to set up. In every
    /// case but success, no child process is left running.
    pub fn run(self, timeout: Duration) -> Result<(), SpawnError>
    {
        let program = self.program.clone()
            .ok_or_else(|| SpawnError::Setup(anyhow::anyhow!("no program set")))?;

        let initial_dir_path = self.initial_dir.as_ref()
            .map(|fd| magic_link_target(fd.as_raw_fd()))
            .transpose()
            .map_err(|err| SpawnError::Setup(err.context("Resolve initial directory")))?;

        let (execve_argv, _keep_argv) = prepare_argv_envp(&self.argv);
        let (execve_envp, _keep_envp) = prepare_argv_envp(&self.envp);

        let (pipe_r, pipe_w) = os_ext::pipe2(0)
            .map_err(|err| SpawnError::Setup(anyhow::Error::from(err)
                .context("Create pipe for parent-child communication")))?;

        let mut cl_args = unsafe { zeroed::<CloneArgs>() };
        cl_args.flags |= self.namespaces.bits();

        let mut pidfd: libc::c_int = -1;
        cl_args.flags |= libc::CLONE_PIDFD as u64;
        cl_args.pidfd = addr_of_mut!(pidfd) as u64;
        cl_args.exit_signal = libc::SIGCHLD as u64;

        let setgroups = self.setgroups.unwrap_or("");
        let uid_map = self.uid_map.as_deref().unwrap_or("");
        let gid_map = self.gid_map.as_deref().unwrap_or("");

        let mounts = &self.mounts;
        let chroot = self.chroot.as_deref();
        let post_chroot_chdir = self.post_chroot_chdir.as_deref();
        let stdio = &self.stdio;

        abort_on_panic();

        // SAFETY: cl_args describes a valid clone3 request.
        let pid = unsafe {
            libc::syscall(
                libc::SYS_clone3,
                addr_of!(cl_args) as *const CloneArgs,
                size_of_val(&cl_args) as libc::size_t,
            )
        };

        // NOTE: No code may appear between the clone3 call above and
        //       the async-signal-safe section below.

        /* ============================================================ */
        /*                BEGIN ASYNC-SIGNAL-SAFE SECTION                */
        /* ============================================================ */
        // No heap allocation, no unwinding, no dynamic dispatch past
        // this point within the child branch. See signal-safety(7).

        let pid = pid as libc::pid_t;

        if pid == 0 {
            drop(pipe_r);

            let enforce = |message: &'static [u8], condition: bool| {
                if !condition {
                    unsafe {
                        let errnum = (*libc::__errno_location()).to_ne_bytes();
                        libc::write(pipe_w.as_raw_fd(), errnum.as_ptr().cast(), 4);
                        libc::write(pipe_w.as_raw_fd(), message.as_ptr().cast(), message.len());
                        libc::_exit(1);
                    }
                }
            };

            unsafe {
                let write_file = |pathname: &'static [u8], data: &str| {
                    if data.is_empty() { return; }
                    let fd = libc::open(pathname.as_ptr().cast(), libc::O_WRONLY, 0);
                    enforce(b"open", fd != -1);
                    let n = libc::write(fd, data.as_ptr().cast(), data.len());
                    enforce(b"write", n == data.len() as isize);
                    libc::close(fd);
                };
                write_file(b"/proc/self/setgroups\0", setgroups);
                write_file(b"/proc/self/uid_map\0", uid_map);
                write_file(b"/proc/self/gid_map\0", gid_map);
            }

            if let Some(path) = &initial_dir_path {
                let r = unsafe { libc::chdir(path.as_ptr()) };
                enforce(b"chdir initial dir", r != -1);
            }

            for mount in mounts {
                let source = mount.source.as_deref().map_or(null(), CStr::as_ptr);
                let target = mount.target.as_deref().map_or(null(), CStr::as_ptr);
                let fstype = mount.fstype.as_deref().map_or(null(), CStr::as_ptr);
                let data = mount.data.as_deref()
                    .map_or(null(), |d| d.as_ptr().cast());
                let r = unsafe {
                    libc::mount(source, target, fstype, mount.flags, data)
                };
                enforce(b"mount", r != -1);
            }

            if let Some(path) = chroot {
                let r = unsafe { libc::chroot(path.as_ptr()) };
                enforce(b"chroot", r != -1);
            }

            if let Some(path) = post_chroot_chdir {
                let r = unsafe { libc::chdir(path.as_ptr()) };
                enforce(b"post-chroot chdir", r != -1);
            }

            apply_stdio(&stdio.stdin, 0, &enforce);
            apply_stdio(&stdio.stdout, 1, &enforce);
            apply_stdio(&stdio.stderr, 2, &enforce);

            unsafe { libc::execve(program.as_ptr(), execve_argv, execve_envp) };
            enforce(b"execve", false);
            unreachable!();
        }

        /* ============================================================ */
        /*                 END ASYNC-SIGNAL-SAFE SECTION                 */
        /* ============================================================ */

        if pid == -1 {
            let err = std::io::Error::last_os_error();
            return Err(SpawnError::Setup(anyhow::Error::from(err).context("clone3")));
        }

        // Armed until the child is confirmed dead; any early return from
        // here on (including via `?`) still kills and reaps the child.
        let child_guard = scope_exit::ScopeExit::new(|| {
            let _ = os_ext::kill(pid, libc::SIGKILL);
            let _ = os_ext::waitpid(pid, libc::WNOHANG);
        });

        // SAFETY: clone3 populated pidfd with a valid, owned descriptor.
        let pidfd = unsafe { OwnedFd::from_raw_fd(pidfd) };

        drop(pipe_w);

        let mut buf = [0u8; 512];
        let nread = File::from(pipe_r).read(&mut buf)
            .map_err(|err| SpawnError::Setup(anyhow::Error::from(err).context("Read from pipe")))?;
        if nread != 0 {
            let errno = i32::from_ne_bytes(buf[.. 4].try_into().unwrap());
            let io_error = std::io::Error::from_raw_os_error(errno);
            let message = String::from_utf8_lossy(&buf[4 .. nread]).into_owned();
            return Err(SpawnError::Setup(
                anyhow::Error::from(io_error)
                    .context(message)
                    .context("Post-fork pre-execve setup"),
            ));
        }

        let mut pollfd = libc::pollfd{fd: pidfd.as_raw_fd(), events: libc::POLLIN, revents: 0};
        let timeout_ms: libc::c_int = timeout.as_millis().try_into().unwrap_or(libc::c_int::MAX);

        let n = os_ext::poll(std::slice::from_mut(&mut pollfd), timeout_ms)
            .map_err(|err| SpawnError::Setup(anyhow::Error::from(err).context("Poll child process")))?;

        if n == 0 {
            return Err(SpawnError::Timeout(timeout));
        }

        // The pidfd is readable: the child has already terminated.
        // Disarm the guard and reap it ourselves to get a real wstatus.
        forget(child_guard);
        let (_, wstatus) = os_ext::waitpid(pid, 0)
            .map_err(|err| SpawnError::Setup(anyhow::Error::from(err).context("waitpid")))?;

        if libc::WIFEXITED(wstatus) && libc::WEXITSTATUS(wstatus) == 0 {
            Ok(())
        } else {
            Err(SpawnError::Terminated(wstatus))
        }
    }
}

fn apply_stdio(
    disposition: &StdioDisposition,
    fd: libc::c_int,
    enforce: &dyn Fn(&'static [u8], bool),
)
{
    match disposition {
        StdioDisposition::Inherit => { },
        StdioDisposition::Close => {
            let r = unsafe { libc::close(fd) };
            enforce(b"close stdio", r != -1);
        },
        StdioDisposition::DupFrom(source) => {
            let r = unsafe { libc::dup2(*source, fd) };
            enforce(b"dup2 stdio", r != -1);
        },
    }
}

fn magic_link_target(fd: libc::c_int) -> anyhow::Result<CString>
{
    use std::os::unix::ffi::OsStrExt;

    // SAFETY: Borrowing fd only to format its /proc/self/fd magic link.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let link = magic_link(borrowed);
    let path = std::ffi::OsStr::from_bytes(link.as_bytes());
    let target = os_ext::readlink(std::path::Path::new(path))?;
    Ok(target)
}

/// Prepare the argv or envp arguments to `execve`.
///
/// `execve` expects these to be arrays of NUL-terminated strings,
/// with a null pointer following the last element of the array. The
/// returned tuple contains a pointer to the array and a handle that
/// must outlive any use of the pointer.
fn prepare_argv_envp(cstrings: &[CString]) -> (*mut *const libc::c_char, impl Drop + '_)
{
    let mut handle: Vec<*const libc::c_char> =
        cstrings.iter()
        .map(|s| s.as_ptr())
        .chain(Some(null()))
        .collect();
    (handle.as_mut_ptr(), handle)
}

/// Failure while spawning or running a [`Command`].
#[derive(Debug, thiserror::Error)]
pub enum SpawnError
{
    /// The child did not terminate within the requested timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    /// The child terminated, but not by a clean zero exit.
    #[error("Child terminated abnormally (wstatus = {0})")]
    Terminated(libc::c_int),
    /// Something failed while setting up the sandbox itself.
    #[error(transparent)]
    Setup(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn cstr(s: &str) -> CString
    {
        CString::new(s).unwrap()
    }

    fn minimal_command() -> Command
    {
        // PID+USER only: enough to observe pid-namespace isolation
        // without needing a prepared scratch directory to chroot into.
        Command::new(cstr("/bin/sh"))
            .namespaces(Namespaces::PID | Namespaces::USER)
            .map_root_to(unsafe { libc::getuid() }, unsafe { libc::getgid() })
    }

    #[test]
    fn runs_pid_1_in_new_namespace()
    {
        let command = minimal_command()
            .argv(vec![cstr("sh"), cstr("-c"), cstr("test $$ -eq 1")]);
        assert!(matches!(command.run(Duration::from_millis(500)), Ok(())));
    }

    #[test]
    fn nonzero_exit_is_terminated_error()
    {
        let command = minimal_command()
            .argv(vec![cstr("sh"), cstr("-c"), cstr("exit 7")]);
        let err = command.run(Duration::from_millis(500)).unwrap_err();
        assert!(matches!(err, SpawnError::Terminated(w)
            if libc::WIFEXITED(w) && libc::WEXITSTATUS(w) == 7));
    }

    #[test]
    fn slow_child_times_out()
    {
        let command = minimal_command()
            .argv(vec![cstr("sh"), cstr("-c"), cstr("sleep 10")]);
        let err = command.run(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, SpawnError::Timeout(_)));
    }
}

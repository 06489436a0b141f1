//! Configuring and running the sandboxed command for one action.

use {
    crate::perform::perform_action,
    kiln_core::{
        ActionContext, ActionDescriptor, ActionError, ActionStatus,
        CommandSetupError, Context, TerminationError, TimeoutError,
    },
    kiln_sandbox::{Command, Mount, Namespaces, SpawnError, Stdio, StdioDisposition},
    os_ext::io::BorrowedFdExt,
    std::{
        ffi::CString,
        os::unix::io::{AsRawFd, OwnedFd},
        path::Path,
    },
};

/// Run the program described by `descriptor` inside a fresh sandbox,
/// caching whatever declared outputs it produces.
///
/// This is the run-action variant of `perform_action`'s step 5: all
/// seven namespaces are unshared, the caller's uid/gid are mapped to
/// root inside the container, `/nix/store` is bound in read-only, and
/// the program's standard streams are wired to the action's log.
pub fn run_action(context: &Context, descriptor: &ActionDescriptor) -> anyhow::Result<ActionStatus>
{
    perform_action(
        context,
        &descriptor.outputs,
        bash_path(),
        coreutils_path(),
        |action_context| run_sandboxed(action_context, descriptor),
    )
}

fn run_sandboxed(action_context: &ActionContext, descriptor: &ActionDescriptor)
    -> Result<(), ActionError>
{
    let log_fd = action_context.log.as_raw_fd();
    let scratch = clone_scratch_fd(action_context)?;

    let command = Command::new(descriptor.program.clone())
        .argv(descriptor.argv.clone())
        .envp(descriptor.envp.clone())
        .namespaces(Namespaces::ALL)
        // SAFETY: getuid/getgid never fail.
        .map_root_to(unsafe { libc::getuid() }, unsafe { libc::getgid() })
        .initial_dir(scratch)
        .mount(Mount::make_root_private())
        .mount(Mount::procfs(Path::new("proc")))
        .mounts(Mount::read_only_bind(Path::new("/nix/store"), Path::new("nix/store")))
        .chroot(CString::new(".").unwrap())
        .post_chroot_chdir(CString::new("/build").unwrap())
        .stdio(Stdio{
            stdin:  StdioDisposition::Close,
            stdout: StdioDisposition::DupFrom(log_fd),
            stderr: StdioDisposition::DupFrom(log_fd),
        });

    command.run(descriptor.timeout).map_err(|err| match err {
        SpawnError::Timeout(timeout)    => ActionError::Timeout(TimeoutError{timeout}),
        SpawnError::Terminated(wstatus) => ActionError::Termination(TerminationError{wstatus}),
        SpawnError::Setup(cause)        => ActionError::CommandSetup(CommandSetupError{cause}),
    })
}

fn clone_scratch_fd(action_context: &ActionContext) -> Result<OwnedFd, ActionError>
{
    action_context.scratch.try_to_owned().map_err(|err| {
        ActionError::CommandSetup(CommandSetupError{
            cause: anyhow::Error::from(err).context("Duplicate scratch directory descriptor"),
        })
    })
}

fn bash_path() -> &'static Path
{
    Path::new(env!("BASH_PATH"))
}

fn coreutils_path() -> &'static Path
{
    Path::new(env!("COREUTILS_PATH"))
}

use std::os::unix::io::RawFd;

/// What to do with one of the child's standard streams.
#[derive(Clone, Copy, Debug, Default)]
pub enum StdioDisposition
{
    /// Close the stream entirely.
    Close,
    /// Leave the stream as inherited from the parent.
    #[default]
    Inherit,
    /// Replace the stream with a `dup2` of the given file descriptor.
    ///
    /// The descriptor is resolved in the parent, before `clone3`, and
    /// must remain valid (not `CLOEXEC`'d away) across the call.
    DupFrom(RawFd),
}

/// Disposition for each of the three standard streams.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stdio
{
    /// Disposition of file descriptor 0.
    pub stdin: StdioDisposition,
    /// Disposition of file descriptor 1.
    pub stdout: StdioDisposition,
    /// Disposition of file descriptor 2.
    pub stderr: StdioDisposition,
}

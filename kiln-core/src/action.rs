//! The data an action is described by, and the environment it runs in.

use {
    crate::error::ActionError,
    std::{
        ffi::{CString, OsStr},
        fmt,
        os::unix::{ffi::OsStrExt, io::BorrowedFd},
        path::{Component, Path, PathBuf},
        time::Duration,
    },
    thiserror::Error,
};

/// A declared output path, relative to `outputs/`.
///
/// Validated at construction: must be relative, non-empty, and must
/// not contain a `..` component. This is ambient boundary validation,
/// the same way the corpus validates untrusted structural input close
/// to the edge rather than deep inside the orchestrator.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct OutputPath(PathBuf);

/// Returned when an output path fails [`OutputPath::new`]'s validation.
#[derive(Debug, Error)]
#[error("{0:?} is not a valid output path: it must be relative, \
         non-empty, and contain no `..` component")]
pub struct OutputPathError(PathBuf);

impl OutputPath
{
    /// Validate and wrap a declared output path.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, OutputPathError>
    {
        let path = path.into();

        let valid = path.as_os_str() != OsStr::new("")
            && path.is_relative()
            && !path.components().any(|c| c == Component::ParentDir);

        if !valid {
            return Err(OutputPathError(path));
        }

        Ok(Self(path))
    }

    /// The validated path.
    pub fn as_path(&self) -> &Path
    {
        &self.0
    }
}

impl AsRef<Path> for OutputPath
{
    fn as_ref(&self) -> &Path
    {
        &self.0
    }
}

impl fmt::Display for OutputPath
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "{}", self.0.display())
    }
}

/// Everything needed to run one hermetic action.
///
/// `program` and the elements of `argv`/`envp` are stored as
/// [`CString`]s because they are handed almost unchanged to
/// `kiln-sandbox`'s `Command`, which in turn passes them to `execve`.
#[derive(Clone, Debug)]
pub struct ActionDescriptor
{
    /// Absolute path to the program to execute, inside the sandbox.
    pub program: CString,

    /// Argument vector. By convention its first element equals `program`.
    pub argv: Vec<CString>,

    /// Environment vector, each entry formatted as `NAME=VALUE`.
    pub envp: Vec<CString>,

    /// Declared outputs the action must produce under `outputs/`.
    pub outputs: Vec<OutputPath>,

    /// Wall-clock budget for the action's program.
    pub timeout: Duration,
}

impl ActionDescriptor
{
    /// Construct a descriptor, validating `outputs` eagerly.
    pub fn new(
        program: CString,
        argv: Vec<CString>,
        envp: Vec<CString>,
        outputs: impl IntoIterator<Item = impl Into<PathBuf>>,
        timeout: Duration,
    ) -> Result<Self, OutputPathError>
    {
        let outputs = outputs.into_iter()
            .map(OutputPath::new)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self{program, argv, envp, outputs, timeout})
    }
}

/// The environment handed to action-specific code while it runs.
///
/// # Invariants
///
/// The action-specific code must not close either FD. It may freely
/// create, modify, and delete files within the scratch directory, and
/// must leave each declared output as a directory entry of `outputs/`
/// once it returns.
pub struct ActionContext<'a>
{
    /// The action's private scratch directory.
    pub scratch: BorrowedFd<'a>,

    /// The action's build log, open for writing.
    pub log: BorrowedFd<'a>,
}

/// Outcome of performing an action.
///
/// Returned to callers, never thrown: a failing action is not a Rust
/// error, it is ordinary data describing what went wrong.
#[derive(Debug)]
pub enum ActionStatus
{
    /// The action ran, every declared output was produced, hashed, and
    /// cached.
    Success
    {
        /// Declared output path to its content hash in the cache.
        outputs: Vec<(OutputPath, kiln_util::hash::Hash)>,
    },

    /// The action ran and every declared output was produced, but the
    /// build log contains warnings.
    ///
    /// No code path currently constructs this variant: warning
    /// detection on the build log is future work (see `kiln-actions`'s
    /// `perform_action` for the single call site a log scan would plug
    /// into). The variant exists so callers can already match on it.
    Warning
    {
        /// Contents of `build.log`.
        log: Vec<u8>,
    },

    /// The action failed: either it did not run to completion, or it
    /// ran but did not produce every declared output.
    Failure
    {
        /// Contents of `build.log`, if the action got far enough to
        /// have one.
        log: Vec<u8>,
        /// The structured cause of the failure.
        cause: ActionError,
    },
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn rejects_absolute_and_parent_relative_outputs()
    {
        assert!(OutputPath::new("m.o").is_ok());
        assert!(OutputPath::new("nested/m.o").is_ok());
        assert!(OutputPath::new("/m.o").is_err());
        assert!(OutputPath::new("").is_err());
        assert!(OutputPath::new("../m.o").is_err());
        assert!(OutputPath::new("a/../m.o").is_err());
    }
}

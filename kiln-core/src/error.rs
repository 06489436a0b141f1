//! Errors attributable to the action under execution, as opposed to
//! failures of the host environment (see the crate-level docs).

use {
    kiln_util::hash::Hash,
    std::{collections::BTreeMap, fmt, time::Duration},
    thiserror::Error,
};

/// A single named field emitted by [`UserError::elaborate`].
///
/// Fields are visited in a fixed, error-specific order; there is no
/// promise of a canonical ordering across variants.
pub enum Field<'a>
{
    /// A free-form string value.
    Str(&'a str),
    /// An integer value, such as a wait status or exit code.
    Int(i64),
    /// A duration, such as a timeout.
    Duration(Duration),
    /// A nested cause, itself rendered via [`fmt::Display`].
    Cause(&'a dyn fmt::Display),
}

impl fmt::Display for Field<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Self::Str(s)      => write!(f, "{s}"),
            Self::Int(i)      => write!(f, "{i}"),
            Self::Duration(d) => write!(f, "{d:?}"),
            Self::Cause(c)    => write!(f, "{c}"),
        }
    }
}

/// A failure attributable to the action under execution rather than to
/// the host environment.
///
/// `UserError` is a capability, not a concrete type: a short [`message`]
/// plus [`elaborate`], which yields the error's named fields to a
/// visitor one at a time. The terminal formatter (see [`Self::render`])
/// is the reference elaborator; callers that need the fields themselves
/// (for example a JSON reporter) can supply their own.
///
/// [`message`]: Self::message
/// [`elaborate`]: Self::elaborate
pub trait UserError: fmt::Debug
{
    /// A short, one-line description of the failure.
    fn message(&self) -> String;

    /// Call `visit` once for each named field of this error, in order.
    fn elaborate(&self, visit: &mut dyn FnMut(&str, Field));

    /// Render this error the way the `kiln` demo binary prints to stderr.
    fn render(&self) -> String
    {
        let mut out = format!("{}\n", self.message());
        self.elaborate(&mut |name, value| {
            out.push_str(&format!(" -> {name} = {value}\n"));
        });
        out
    }
}

/// The action's program exceeded its configured timeout and was killed.
#[derive(Debug, Error)]
#[error("action timed out")]
pub struct TimeoutError
{
    /// The timeout that was exceeded.
    pub timeout: Duration,
}

impl UserError for TimeoutError
{
    fn message(&self) -> String { self.to_string() }

    fn elaborate(&self, visit: &mut dyn FnMut(&str, Field))
    {
        visit("timeout", Field::Duration(self.timeout));
    }
}

/// The action's program exited with a non-zero status or was killed by
/// a signal.
#[derive(Debug, Error)]
#[error("action exited unsuccessfully")]
pub struct TerminationError
{
    /// The raw `wstatus` as returned by `waitpid`.
    pub wstatus: libc::c_int,
}

impl UserError for TerminationError
{
    fn message(&self) -> String { self.to_string() }

    fn elaborate(&self, visit: &mut dyn FnMut(&str, Field))
    {
        visit("wstatus", Field::Int(self.wstatus as i64));
    }
}

/// Constructing or spawning the sandboxed process failed before it
/// could run the action's program at all.
#[derive(Debug, Error)]
#[error("failed to set up sandboxed command")]
pub struct CommandSetupError
{
    /// The underlying cause, typically from `kiln-sandbox`.
    pub cause: anyhow::Error,
}

impl UserError for CommandSetupError
{
    fn message(&self) -> String { self.to_string() }

    fn elaborate(&self, visit: &mut dyn FnMut(&str, Field))
    {
        visit("cause", Field::Cause(&self.cause));
    }
}

/// The `outputs/` directory could not be opened after the action's
/// program returned.
#[derive(Debug, Error)]
#[error("outputs directory is inaccessible")]
pub struct OutputsDirectoryInaccessibleError
{
    /// The underlying I/O error from opening `outputs/`.
    pub cause: std::io::Error,
}

impl UserError for OutputsDirectoryInaccessibleError
{
    fn message(&self) -> String { self.to_string() }

    fn elaborate(&self, visit: &mut dyn FnMut(&str, Field))
    {
        visit("cause", Field::Cause(&self.cause));
    }
}

/// One or more declared outputs could not be hashed.
///
/// Every declared output is attempted; this collects every failure
/// rather than stopping at the first one, so the caller sees every bad
/// output in a single report.
#[derive(Debug, Error)]
#[error("one or more outputs are inaccessible")]
pub struct OutputsInaccessibleError
{
    /// Output path (relative to `outputs/`) to the I/O error hashing it.
    pub causes: BTreeMap<std::path::PathBuf, std::io::Error>,
}

impl UserError for OutputsInaccessibleError
{
    fn message(&self) -> String { self.to_string() }

    fn elaborate(&self, visit: &mut dyn FnMut(&str, Field))
    {
        for (path, cause) in &self.causes {
            visit(&path.display().to_string(), Field::Cause(cause));
        }
    }
}

/// Every distinct failure an action can produce, erased to a trait
/// object so [`crate::ActionStatus::Failure`] can carry any of them.
#[derive(Debug, Error)]
pub enum ActionError
{
    /// See [`TimeoutError`].
    #[error(transparent)]
    Timeout(TimeoutError),
    /// See [`TerminationError`].
    #[error(transparent)]
    Termination(TerminationError),
    /// See [`CommandSetupError`].
    #[error(transparent)]
    CommandSetup(CommandSetupError),
    /// See [`OutputsDirectoryInaccessibleError`].
    #[error(transparent)]
    OutputsDirectoryInaccessible(OutputsDirectoryInaccessibleError),
    /// See [`OutputsInaccessibleError`].
    #[error(transparent)]
    OutputsInaccessible(OutputsInaccessibleError),
}

impl UserError for ActionError
{
    fn message(&self) -> String
    {
        match self {
            Self::Timeout(e)                      => e.message(),
            Self::Termination(e)                  => e.message(),
            Self::CommandSetup(e)                 => e.message(),
            Self::OutputsDirectoryInaccessible(e)  => e.message(),
            Self::OutputsInaccessible(e)           => e.message(),
        }
    }

    fn elaborate(&self, visit: &mut dyn FnMut(&str, Field))
    {
        match self {
            Self::Timeout(e)                      => e.elaborate(visit),
            Self::Termination(e)                  => e.elaborate(visit),
            Self::CommandSetup(e)                 => e.elaborate(visit),
            Self::OutputsDirectoryInaccessible(e)  => e.elaborate(visit),
            Self::OutputsInaccessible(e)           => e.elaborate(visit),
        }
    }
}

/// Content hash of a successfully produced and cached output.
///
/// Exposed alongside [`crate::ActionStatus::Success`] so callers can
/// report where each declared output landed in the cache.
pub type OutputHash = Hash;

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn render_matches_documented_format()
    {
        let err = TimeoutError{timeout: Duration::from_millis(100)};
        assert_eq!(err.render(), "action timed out\n -> timeout = 100ms\n");
    }

    #[test]
    fn outputs_inaccessible_lists_every_entry()
    {
        let mut causes = BTreeMap::new();
        causes.insert(
            std::path::PathBuf::from("m.o"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        let err = OutputsInaccessibleError{causes};
        let rendered = err.render();
        assert!(rendered.starts_with("one or more outputs are inaccessible\n"));
        assert!(rendered.contains(" -> m.o = "));
    }
}

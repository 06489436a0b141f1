//! Generic orchestration shared by every kind of action.

use {
    kiln_core::{
        ActionContext, ActionError, ActionStatus, Context, OutputPath,
        OutputsDirectoryInaccessibleError, OutputsInaccessibleError,
    },
    kiln_util::hash::hash_file_at,
    os_ext::{O_CREAT, O_DIRECTORY, O_PATH, O_RDWR, mkdirat, openat, symlinkat},
    std::{
        collections::BTreeMap,
        ffi::CString,
        fs::File,
        io::{self, Read, Seek, SeekFrom},
        os::unix::{ffi::OsStringExt, io::{AsFd, BorrowedFd}},
        path::{Path, PathBuf},
    },
};

/// Run one action to completion inside a fresh scratch directory.
///
/// `action_code` receives an [`ActionContext`] pointing at the scratch
/// directory's `build`/`outputs` subdirectories and must leave every
/// path in `outputs` present as a directory entry of `outputs/` by the
/// time it returns `Ok`.
///
/// Failures attributable to the host environment (a scratch directory
/// that cannot be created, a symlink that cannot be written) propagate
/// through `?` rather than becoming part of the returned
/// [`ActionStatus`]; only failures attributable to the action itself
/// — a non-zero exit, a missing output — end up there.
pub fn perform_action(
    context: &Context,
    outputs: &[OutputPath],
    bash_path: &Path,
    coreutils_path: &Path,
    action_code: impl FnOnce(&ActionContext) -> Result<(), ActionError>,
) -> anyhow::Result<ActionStatus>
{
    use anyhow::Context as _;

    let scratch = context.new_scratch_dir().context("Create scratch directory")?;
    let scratch = scratch.as_fd();

    populate_skeleton(scratch).context("Populate scratch directory skeleton")?;
    install_implicit_dependencies(scratch, bash_path, coreutils_path)
        .context("Create implicit-dependency symlinks")?;

    let log = openat(Some(scratch), Path::new("build.log"), O_CREAT | O_RDWR, 0o644)
        .context("Create build.log")?;

    let read_log = || -> anyhow::Result<Vec<u8>> {
        let mut file = File::from(log.try_clone()?);
        file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    };

    let action_context = ActionContext{scratch, log: log.as_fd()};

    if let Err(cause) = action_code(&action_context) {
        return Ok(ActionStatus::Failure{log: read_log()?, cause});
    }

    let outputs_dir = match openat(Some(scratch), Path::new("outputs"), O_DIRECTORY | O_PATH, 0) {
        Ok(fd) => fd,
        Err(err) => {
            let cause = ActionError::OutputsDirectoryInaccessible(
                OutputsDirectoryInaccessibleError{cause: err});
            return Ok(ActionStatus::Failure{log: read_log()?, cause});
        },
    };

    let mut hashes = Vec::with_capacity(outputs.len());
    let mut failures = BTreeMap::new();
    for output in outputs {
        match hash_file_at(Some(outputs_dir.as_fd()), output.as_path()) {
            Ok(hash) => hashes.push((output.clone(), hash)),
            Err(err) => { failures.insert(output.as_path().to_owned(), err); },
        }
    }

    if !failures.is_empty() {
        let cause = ActionError::OutputsInaccessible(OutputsInaccessibleError{causes: failures});
        return Ok(ActionStatus::Failure{log: read_log()?, cause});
    }

    for (output, hash) in &hashes {
        context.store_cached_output(*hash, Some(outputs_dir.as_fd()), output.as_path())
            .with_context(|| format!("Install cached output {output}"))?;
    }

    // TODO(warnings): scan build.log for a warnings regex and return
    // ActionStatus::Warning; no action currently supplies such a regex.
    Ok(ActionStatus::Success{outputs: hashes})
}

fn populate_skeleton(scratch: BorrowedFd) -> io::Result<()>
{
    let mk = |path, mode| mkdirat(Some(scratch), Path::new(path), mode);
    mk("bin",     0o755)?;
    mk("nix",     0o755)?;
    mk("nix/store", 0o755)?;
    mk("proc",    0o555)?;
    mk("usr",     0o755)?;
    mk("usr/bin", 0o755)?;
    mk("build",   0o755)?;
    mk("outputs", 0o755)?;
    Ok(())
}

fn install_implicit_dependencies(
    scratch: BorrowedFd,
    bash_path: &Path,
    coreutils_path: &Path,
) -> io::Result<()>
{
    let sh = path_to_cstring(bash_path.join("bin/bash"))?;
    let env = path_to_cstring(coreutils_path.join("bin/env"))?;
    symlinkat(&sh, Some(scratch), Path::new("bin/sh"))?;
    symlinkat(&env, Some(scratch), Path::new("usr/bin/env"))?;
    Ok(())
}

fn path_to_cstring(path: PathBuf) -> io::Result<CString>
{
    CString::new(path.into_os_string().into_vec())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        kiln_core::TerminationError,
        os_ext::{O_WRONLY, io::BorrowedFdExt, mkdtemp},
        scope_exit::scope_exit,
        std::{fs::remove_dir_all, path::PathBuf},
    };

    fn temp_dir() -> PathBuf
    {
        let template = CString::new("/tmp/kiln-actions-test-XXXXXX").unwrap();
        let path = mkdtemp(template).unwrap();
        PathBuf::from(std::ffi::OsString::from_vec(path.into_bytes()))
    }

    #[test]
    fn success_caches_every_declared_output()
    {
        let state_dir = temp_dir();
        scope_exit! { let _ = remove_dir_all(&state_dir); }
        let context = Context::open(&state_dir).unwrap();

        let outputs = vec![OutputPath::new("m.o").unwrap()];
        let status = perform_action(
            &context, &outputs, Path::new("/bash"), Path::new("/coreutils"),
            |action_context| {
                let outputs_dir = openat(
                    Some(action_context.scratch), Path::new("outputs"),
                    O_DIRECTORY | O_PATH, 0,
                ).unwrap();
                let fd = openat(
                    Some(outputs_dir.as_fd()), Path::new("m.o"),
                    O_CREAT | O_WRONLY, 0o644,
                ).unwrap();
                use std::io::Write;
                File::from(fd).write_all(b"hi\n").unwrap();
                Ok(())
            },
        ).unwrap();

        match status {
            ActionStatus::Success{outputs} => assert_eq!(outputs.len(), 1),
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[test]
    fn action_failure_is_reported_with_log()
    {
        let state_dir = temp_dir();
        scope_exit! { let _ = remove_dir_all(&state_dir); }
        let context = Context::open(&state_dir).unwrap();

        let status = perform_action(
            &context, &[], Path::new("/bash"), Path::new("/coreutils"),
            |action_context| {
                use std::io::Write;
                File::from(action_context.log.try_to_owned().unwrap())
                    .write_all(b"boom\n").unwrap();
                Err(ActionError::Termination(TerminationError{wstatus: 0}))
            },
        ).unwrap();

        match status {
            ActionStatus::Failure{log, cause: ActionError::Termination(_)} =>
                assert_eq!(log, b"boom\n"),
            other => panic!("expected Failure, got {other:?}"),
        }
    }
}

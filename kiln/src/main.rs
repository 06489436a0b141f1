//! Minimal demo binary: run one hardcoded action against a state directory.
//!
//! This is not a build system: there is no action graph, no build
//! file, and no label resolution. It exists to exercise `kiln-core`
//! and `kiln-actions` end to end against a real Linux sandbox.

use {
    anyhow::Context as _,
    kiln_actions::run_action,
    kiln_core::{ActionDescriptor, ActionStatus, Context, UserError},
    std::{env, ffi::CString, path::PathBuf, process::ExitCode, time::Duration},
};

fn main() -> ExitCode
{
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        },
    }
}

fn run() -> anyhow::Result<ExitCode>
{
    let state_dir = env::args_os().nth(1)
        .map(PathBuf::from)
        .context("usage: kiln <state-dir>")?;

    let context = Context::open(&state_dir).context("Open state directory")?;

    let descriptor = ActionDescriptor::new(
        CString::new("/bin/sh").unwrap(),
        vec![
            CString::new("sh").unwrap(),
            CString::new("-c").unwrap(),
            CString::new("echo hello > /outputs/greeting.txt").unwrap(),
        ],
        vec![CString::new("PATH=/bin:/usr/bin").unwrap()],
        ["greeting.txt"],
        Duration::from_secs(10),
    ).context("Build action descriptor")?;

    match run_action(&context, &descriptor).context("Run action")? {
        ActionStatus::Success{outputs} => {
            for (output, hash) in outputs {
                println!("{output} -> {hash}");
            }
            Ok(ExitCode::SUCCESS)
        },
        ActionStatus::Warning{log} => {
            print!("{}", String::from_utf8_lossy(&log));
            Ok(ExitCode::SUCCESS)
        },
        ActionStatus::Failure{log, cause} => {
            eprint!("{}", String::from_utf8_lossy(&log));
            eprint!("{}", cause.render());
            Ok(ExitCode::FAILURE)
        },
    }
}

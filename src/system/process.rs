//! Thin wrapper around `std::process::Command`, used for invoking
//! `pkg-config` during library auto-resolution.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};

use crate::error::Error;

/// Run `arg0 args...` to completion and return its captured stdout as a
/// `String`, mapping a non-zero exit or a spawn failure into [`Error`].
pub fn run_captured<S, I, A>(arg0: S, args: I) -> Result<String, Error>
where
    S: AsRef<OsStr>,
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let arg0_display = arg0.as_ref().to_string_lossy().to_string();
    let mut command = Command::new(arg0.as_ref());
    command.args(args);
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| Error::SpawnChild(arg0_display.clone(), e))?;

    let stdout = child.stdout.take().map(|s| {
        let mut out = String::new();
        for line in BufReader::new(s).lines().map_while(Result::ok) {
            out.push_str(&line);
            out.push('\n');
        }
        out
    });

    let status = child
        .wait()
        .map_err(|e| Error::SpawnChild(arg0_display.clone(), e))?;
    if !status.success() {
        return Err(Error::ExternalCommand(arg0_display));
    }

    Ok(stdout.unwrap_or_default())
}

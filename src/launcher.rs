use std::io;
use std::process::{self, Stdio};

use os_pipe::{PipeReader, PipeWriter};

use crate::error::ShellError;
use crate::redirect::ResolvedCommand;

/// Spawn one OS process for `command` without waiting for it.
///
/// `stdin` / `stdout` are the pipe ends assigned by the pipe chain. A file
/// redirection on stdout replaces the pipe-assigned descriptor. The pipe ends
/// and opened files are owned by the `process::Command` and close in the
/// parent when this function returns.
pub fn launch(
    command: &ResolvedCommand,
    stdin: Option<PipeReader>,
    stdout: Option<PipeWriter>,
) -> Result<libc::pid_t, ShellError> {
    let mut process = process::Command::new(command.program());
    process.args(command.args());

    if let Some(reader) = stdin {
        process.stdin(Stdio::from(reader));
    }

    let redirects = &command.redirects;
    match (&redirects.stdout, stdout) {
        (Some(redirect), _) => {
            process.stdout(Stdio::from(redirect.open()?));
        }
        (None, Some(writer)) => {
            process.stdout(Stdio::from(writer));
        }
        (None, None) => {}
    }

    if let Some(redirect) = &redirects.stderr {
        process.stderr(Stdio::from(redirect.open()?));
    }

    let child = process
        .spawn()
        .map_err(|source| classify_spawn_error(command.program(), source))?;

    let pid = child.id() as libc::pid_t;
    log::debug!("launched {} as pid {pid}", command.program());

    // Waiting happens through waitpid on the raw pid; the handle is not needed.
    drop(child);
    Ok(pid)
}

/// Split spawn failures into "this program can't run" (confined to the stage)
/// and "the system is out of something" (aborts the pipeline).
fn classify_spawn_error(program: &str, source: io::Error) -> ShellError {
    let exec_failure = matches!(
        source.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput
    ) || matches!(
        source.raw_os_error(),
        Some(libc::ENOEXEC) | Some(libc::ENOTDIR) | Some(libc::EISDIR) | Some(libc::ENAMETOOLONG)
    );

    if exec_failure {
        ShellError::Exec {
            program: program.to_string(),
            source,
        }
    } else {
        ShellError::Resource {
            context: "fork",
            source,
        }
    }
}

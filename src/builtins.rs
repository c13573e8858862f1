use std::io::Write;
use std::path::PathBuf;

use crate::error::ShellError;
use crate::job_control;
use crate::jobs::{Job, JobState, JobTable};

/// The list of all builtin command names.
const BUILTINS: &[&str] = &["exit", "cd", "jobs", "fg", "bg"];

#[derive(Debug)]
pub enum BuiltinAction {
    Continue(i32),
    Exit(i32),
    /// `fg` resumed this job; the executor must now block on it.
    Foreground(Job),
}

/// Returns true if the command name is a shell builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Execute a builtin command in the shell's own process, writing output to
/// the provided streams.
pub fn execute(
    program: &str,
    args: &[String],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    job_table: &mut JobTable,
) -> BuiltinAction {
    match program {
        "exit" => BuiltinAction::Exit(0),
        "cd" => BuiltinAction::Continue(builtin_cd(args, stderr)),
        "jobs" => BuiltinAction::Continue(builtin_jobs(job_table, stdout)),
        "fg" => builtin_fg(args, job_table, stdout, stderr),
        "bg" => BuiltinAction::Continue(builtin_bg(args, job_table, stdout, stderr)),
        _ => {
            let _ = writeln!(stderr, "msh: unknown builtin: {program}");
            BuiltinAction::Continue(1)
        }
    }
}

fn builtin_cd(args: &[String], stderr: &mut dyn Write) -> i32 {
    let home = std::env::var("HOME").ok();
    let target = match cd_target(args, home.as_deref()) {
        Ok(target) => target,
        Err(message) => {
            let _ = writeln!(stderr, "msh: cd: {message}");
            return 1;
        }
    };

    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(stderr, "msh: cd: {}: {e}", target.display());
        return 1;
    }

    log::debug!("cwd is now {}", target.display());
    0
}

/// Work out where `cd` should go. No argument or `~` means home; a leading
/// `~/` is replaced with the home directory.
pub fn cd_target(args: &[String], home: Option<&str>) -> Result<PathBuf, String> {
    let home_dir = || home.map(PathBuf::from).ok_or_else(|| "HOME not set".to_string());

    match args {
        [] => home_dir(),
        [dir] if dir == "~" => home_dir(),
        [dir] => match dir.strip_prefix("~/") {
            Some(rest) => Ok(home_dir()?.join(rest)),
            None => Ok(PathBuf::from(dir)),
        },
        _ => Err("too many arguments".to_string()),
    }
}

// ── Job control builtins ──

/// Reap finished jobs, then list what is left as `[index] display`.
fn builtin_jobs(job_table: &mut JobTable, stdout: &mut dyn Write) -> i32 {
    for done in job_table.reap() {
        let _ = writeln!(stdout, "[{}] Done {}", done.index, done.display);
    }

    for (index, display) in job_table.list() {
        let _ = writeln!(stdout, "[{index}] {display}");
    }
    0
}

/// Take a job out of the table, resume it, and hand it to the executor to
/// wait on in the foreground.
fn builtin_fg(
    args: &[String],
    job_table: &mut JobTable,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> BuiltinAction {
    let index = match resolve_job_index("fg", args, job_table.most_recent(), stderr) {
        Some(index) => index,
        None => return BuiltinAction::Continue(1),
    };

    let job = match job_table.remove(index) {
        Ok(job) => job,
        Err(_) => {
            report(stderr, &ShellError::JobNotFound { builtin: "fg", index });
            return BuiltinAction::Continue(1);
        }
    };

    let _ = writeln!(stdout, "{}", job.display);

    if let Err(e) = job_control::continue_all(&job.pids) {
        let _ = writeln!(stderr, "msh: fg: {e}");
    }

    BuiltinAction::Foreground(job)
}

/// Resume a stopped job without foregrounding it.
fn builtin_bg(
    args: &[String],
    job_table: &mut JobTable,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let index = match resolve_job_index("bg", args, job_table.most_recent_stopped(), stderr) {
        Some(index) => index,
        None => return 1,
    };

    let job = match job_table.lookup_mut(index) {
        Ok(job) => job,
        Err(_) => {
            report(stderr, &ShellError::JobNotFound { builtin: "bg", index });
            return 1;
        }
    };

    if job.state != JobState::Stopped {
        let _ = writeln!(stderr, "msh: bg: job {index} is not stopped");
        return 1;
    }

    if let Err(e) = job_control::continue_all(&job.pids) {
        let _ = writeln!(stderr, "msh: bg: {e}");
        return 1;
    }

    job.state = JobState::Running;
    let _ = writeln!(stdout, "[{}] {} &", job.index, job.display);
    0
}

// ── Helpers ──

fn report(stderr: &mut dyn Write, err: &ShellError) {
    let _ = writeln!(stderr, "msh: {err}");
}

/// Parse a job index from the first argument (accepts `%N` or `N`), falling
/// back to `default` when no argument is given.
fn resolve_job_index(
    builtin: &str,
    args: &[String],
    default: Option<usize>,
    stderr: &mut dyn Write,
) -> Option<usize> {
    match args.first() {
        Some(s) => match s.trim_start_matches('%').parse::<usize>() {
            Ok(index) => Some(index),
            Err(_) => {
                let _ = writeln!(stderr, "msh: {builtin}: {s}: invalid job index");
                None
            }
        },
        None => {
            if default.is_none() {
                let _ = writeln!(stderr, "msh: {builtin}: no current job");
            }
            default
        }
    }
}

use std::fmt;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use crate::command::Command;
use crate::config::Limits;
use crate::error::{ShellError, ValidationError};

/// A standard stream that can be redirected to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout = 1,
    Stderr = 2,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("stdout"),
            Stream::Stderr => f.write_str("stderr"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Truncate,
    Append,
}

/// A single file redirection instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub stream: Stream,
    pub path: PathBuf,
    pub mode: RedirectMode,
}

impl Redirect {
    /// Create (or open) the target file according to the mode.
    pub fn open(&self) -> Result<File, ShellError> {
        let mut options = OpenOptions::new();
        options.create(true).mode(0o644);
        match self.mode {
            RedirectMode::Truncate => options.write(true).truncate(true),
            RedirectMode::Append => options.append(true),
        };

        options.open(&self.path).map_err(|source| ShellError::Redirect {
            path: self.path.clone(),
            source,
        })
    }
}

/// At most one redirection per stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirections {
    pub stdout: Option<Redirect>,
    pub stderr: Option<Redirect>,
}

impl Redirections {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }

    fn slot(&mut self, stream: Stream) -> &mut Option<Redirect> {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }
}

/// A command that passed validation: redirection tokens stripped out of the
/// argument vector and recorded separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    /// Exec argument vector, program name first.
    argv: Vec<String>,
    pub redirects: Redirections,
    pub position: usize,
}

impl ResolvedCommand {
    pub fn program(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.argv.split_first().map_or(&[], |(_, rest)| rest)
    }
}

/// Operators we recognise, longest first so `1>>` wins over `1>`.
const OPERATORS: &[(&str, Stream, RedirectMode)] = &[
    ("1>>", Stream::Stdout, RedirectMode::Append),
    ("2>>", Stream::Stderr, RedirectMode::Append),
    ("1>", Stream::Stdout, RedirectMode::Truncate),
    ("2>", Stream::Stderr, RedirectMode::Truncate),
    (">>", Stream::Stdout, RedirectMode::Append),
    (">", Stream::Stdout, RedirectMode::Truncate),
];

fn match_operator(token: &str) -> Option<(&'static str, Stream, RedirectMode, &str)> {
    OPERATORS.iter().find_map(|&(op, stream, mode)| {
        token
            .strip_prefix(op)
            .map(|rest| (op, stream, mode, rest))
    })
}

/// Separate redirection operators from the command's arguments and check
/// them against the pipeline shape and argument limit.
///
/// Handles `1>`, `1>>`, `2>`, `2>>` (plus `>` / `>>` for stdout), with the
/// filename either as the next token or attached (`1>out.txt`).
pub fn resolve(command: &Command, limits: &Limits) -> Result<ResolvedCommand, ValidationError> {
    let program = command.program().to_string();
    let tokens = command.args();
    let mut argv = Vec::with_capacity(tokens.len());
    let mut redirects = Redirections::default();
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];

        // The program name itself is never an operator.
        let matched = if i == 0 { None } else { match_operator(token) };

        match matched {
            Some((operator, stream, mode, attached)) => {
                let path = if attached.is_empty() {
                    i += 1;
                    tokens
                        .get(i)
                        .map(String::as_str)
                        .ok_or_else(|| ValidationError::MissingTarget {
                            program: program.clone(),
                            operator: operator.to_string(),
                        })?
                } else {
                    attached
                };

                let slot = redirects.slot(stream);
                if slot.is_some() {
                    return Err(ValidationError::DuplicateRedirect {
                        program,
                        stream,
                    });
                }
                *slot = Some(Redirect {
                    stream,
                    path: PathBuf::from(path),
                    mode,
                });
            }
            None => argv.push(token.clone()),
        }

        i += 1;
    }

    // Only stdout travels through a pipe.
    if !command.is_last() && redirects.stdout.is_some() {
        return Err(ValidationError::PipeConflict {
            program,
            stream: Stream::Stdout,
        });
    }

    if argv.len() - 1 > limits.max_args {
        return Err(ValidationError::TooManyArguments {
            program,
            max: limits.max_args,
        });
    }

    Ok(ResolvedCommand {
        argv,
        redirects,
        position: command.position(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn command(words: &[&str], last: bool) -> Command {
        Command::new(words.iter().map(|w| w.to_string()).collect(), 0, last).unwrap()
    }

    fn resolve_words(words: &[&str]) -> Result<ResolvedCommand, ValidationError> {
        resolve(&command(words, true), &Limits::default())
    }

    #[test]
    fn no_redirection_keeps_argv() {
        let resolved = resolve_words(&["echo", "hello", "world"]).unwrap();
        assert_eq!(resolved.argv, vec!["echo", "hello", "world"]);
        assert!(resolved.redirects.is_empty());
    }

    #[test]
    fn empty_argv_has_no_program_or_args() {
        let resolved = ResolvedCommand {
            argv: Vec::new(),
            redirects: Redirections::default(),
            position: 0,
        };
        assert_eq!(resolved.program(), "");
        assert!(resolved.args().is_empty());
    }

    #[test]
    fn stdout_truncate_is_stripped() {
        let resolved = resolve_words(&["echo", "hello", "1>", "out.txt"]).unwrap();
        assert_eq!(resolved.argv, vec!["echo", "hello"]);
        let redirect = resolved.redirects.stdout.unwrap();
        assert_eq!(redirect.path, PathBuf::from("out.txt"));
        assert_eq!(redirect.mode, RedirectMode::Truncate);
        assert_eq!(redirect.stream as i32, 1);
    }

    #[test]
    fn append_and_stderr_together() {
        let resolved =
            resolve_words(&["cmd", "1>>", "log.txt", "2>", "err.txt", "arg"]).unwrap();
        assert_eq!(resolved.argv, vec!["cmd", "arg"]);
        assert_eq!(
            resolved.redirects.stdout.as_ref().map(|r| r.mode),
            Some(RedirectMode::Append)
        );
        let stderr = resolved.redirects.stderr.unwrap();
        assert_eq!(stderr.stream, Stream::Stderr);
        assert_eq!(stderr.mode, RedirectMode::Truncate);
    }

    #[test]
    fn attached_filename() {
        let resolved = resolve_words(&["ls", "2>>errors.log"]).unwrap();
        assert_eq!(resolved.argv, vec!["ls"]);
        let stderr = resolved.redirects.stderr.unwrap();
        assert_eq!(stderr.path, PathBuf::from("errors.log"));
        assert_eq!(stderr.mode, RedirectMode::Append);
    }

    #[test]
    fn bare_gt_is_stdout() {
        let resolved = resolve_words(&["echo", "x", ">>", "f"]).unwrap();
        assert_eq!(
            resolved.redirects.stdout.map(|r| r.mode),
            Some(RedirectMode::Append)
        );
    }

    #[test]
    fn missing_filename_is_error() {
        assert_eq!(
            resolve_words(&["echo", "1>"]),
            Err(ValidationError::MissingTarget {
                program: "echo".into(),
                operator: "1>".into(),
            })
        );
    }

    #[test]
    fn same_stream_twice_is_error() {
        assert!(matches!(
            resolve_words(&["echo", "1>", "a", "1>>", "b"]),
            Err(ValidationError::DuplicateRedirect { stream: Stream::Stdout, .. })
        ));
        assert!(matches!(
            resolve_words(&["echo", "2>", "a", "2>", "b"]),
            Err(ValidationError::DuplicateRedirect { stream: Stream::Stderr, .. })
        ));
    }

    #[test]
    fn stdout_redirect_before_pipe_conflicts() {
        let cmd = command(&["ls", "1>", "out.txt"], false);
        assert!(matches!(
            resolve(&cmd, &Limits::default()),
            Err(ValidationError::PipeConflict { stream: Stream::Stdout, .. })
        ));
    }

    #[test]
    fn stderr_redirect_before_pipe_is_fine() {
        let cmd = command(&["ls", "2>", "err.txt"], false);
        assert!(resolve(&cmd, &Limits::default()).is_ok());
    }

    #[test]
    fn argument_limit_counts_after_stripping() {
        let limits = Limits {
            max_args: 2,
            ..Limits::default()
        };
        let ok = command(&["echo", "a", "b", "1>", "f"], true);
        assert!(resolve(&ok, &limits).is_ok());

        let too_many = command(&["echo", "a", "b", "c"], true);
        assert_eq!(
            resolve(&too_many, &limits),
            Err(ValidationError::TooManyArguments {
                program: "echo".into(),
                max: 2,
            })
        );
    }

    #[test]
    fn open_truncates_or_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "old contents\n").unwrap();

        let append = Redirect {
            stream: Stream::Stdout,
            path: path.clone(),
            mode: RedirectMode::Append,
        };
        append.open().unwrap().write_all(b"more\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old contents\nmore\n");

        let truncate = Redirect {
            mode: RedirectMode::Truncate,
            ..append
        };
        truncate.open().unwrap().write_all(b"new\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn open_failure_names_the_path() {
        let redirect = Redirect {
            stream: Stream::Stdout,
            path: PathBuf::from("/nonexistent-dir-for-msh/out.txt"),
            mode: RedirectMode::Truncate,
        };
        let err = redirect.open().unwrap_err();
        assert!(err.to_string().starts_with("/nonexistent-dir-for-msh/out.txt: "));
    }
}

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::redirect::Stream;

/// Everything that can go wrong while running a pipeline.
///
/// Each variant is reported as one `msh: ...` line on the shell's standard
/// error; none of them terminates the shell except `SignalSetup`, which can
/// only happen at startup.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Pipe or process creation ran out of a system resource.
    #[error("{context}: {source}")]
    Resource {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// The target program could not be executed. Confined to one stage.
    #[error("{program}: {}", exec_reason(.source))]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{builtin}: {index}: no such job")]
    JobNotFound { builtin: &'static str, index: usize },

    #[error("job table full ({capacity} jobs); job left running untracked")]
    JobTableFull { capacity: usize },

    #[error("failed to install signal handlers: {0}")]
    SignalSetup(String),
}

impl ShellError {
    /// Exit status recorded for a stage that failed with this error.
    pub fn stage_status(&self) -> i32 {
        match self {
            ShellError::Exec { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            ShellError::Exec { .. } => 126,
            ShellError::Validation(_) => 2,
            _ => 1,
        }
    }

    /// Whether this failure should stop the remaining stages from launching.
    pub fn aborts_pipeline(&self) -> bool {
        matches!(self, ShellError::Resource { .. } | ShellError::Validation(_))
    }
}

impl From<ctrlc::Error> for ShellError {
    fn from(e: ctrlc::Error) -> Self {
        ShellError::SignalSetup(e.to_string())
    }
}

fn exec_reason(source: &io::Error) -> String {
    match source.kind() {
        io::ErrorKind::NotFound => "command not found".to_string(),
        _ => source.to_string(),
    }
}

/// Semantic problems found before any process of a pipeline exists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{program}: more than one {stream} redirection")]
    DuplicateRedirect { program: String, stream: Stream },

    #[error("{program}: {stream} is redirected to a file but also piped to the next command")]
    PipeConflict { program: String, stream: Stream },

    #[error("{program}: expected filename after '{operator}'")]
    MissingTarget { program: String, operator: String },

    #[error("{program}: too many arguments (max {max})")]
    TooManyArguments { program: String, max: usize },

    #[error("too many commands in pipeline (max {max})")]
    TooManyCommands { max: usize },
}

/// Structural problems in raw input, raised by the line splitter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("syntax error: empty command in pipeline `{0}'")]
    EmptyCommand(String),

    #[error("syntax error near unexpected token `{0}'")]
    UnexpectedToken(char),
}

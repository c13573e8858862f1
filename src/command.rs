use std::collections::VecDeque;

/// One program invocation as handed over by the parser.
///
/// `args` is the raw argument vector, program name first, with any
/// redirection operators still embedded; the redirection resolver strips
/// them before exec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
    position: usize,
    last: bool,
}

impl Command {
    /// Build a command from its words. Returns `None` for an empty word list.
    pub fn new(words: Vec<String>, position: usize, last: bool) -> Option<Self> {
        let program = words.first()?.clone();
        Some(Self {
            program,
            args: words,
            position,
            last,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument vector, program name first.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Index of this command within its pipeline.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_last(&self) -> bool {
        self.last
    }
}

/// Commands connected by pipes, executed as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    commands: Vec<Command>,
    background: bool,
    source: String,
}

impl Pipeline {
    pub fn new(commands: Vec<Command>, background: bool, source: impl Into<String>) -> Self {
        Self {
            commands,
            background,
            source: source.into(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Source text as typed, without the trailing `&`. Used for `jobs`.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// FIFO queue of pipelines from one line of input.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sequence {
    pipelines: VecDeque<Pipeline>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pipeline: Pipeline) {
        self.pipelines.push_back(pipeline);
    }

    /// Dequeue the next pipeline; the caller now owns it.
    pub fn next_pipeline(&mut self) -> Option<Pipeline> {
        self.pipelines.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl Iterator for Sequence {
    type Item = Pipeline;

    fn next(&mut self) -> Option<Pipeline> {
        self.next_pipeline()
    }
}

use os_pipe::{PipeReader, PipeWriter};

use crate::error::ShellError;

/// Both ends of one anonymous pipe. An end is `None` once it has been handed
/// to a process or released.
struct Link {
    reader: Option<PipeReader>,
    writer: Option<PipeWriter>,
}

/// The `k - 1` pipes joining `k` commands.
///
/// Pipe `i` carries the stdout of command `i` into the stdin of command
/// `i + 1`. Ends are moved out as each command launches, so the parent's copy
/// closes as soon as that launch is done; anything still held here closes when
/// the chain is dropped, on every exit path.
pub struct PipeChain {
    links: Vec<Link>,
}

impl PipeChain {
    /// Allocate every pipe up front, before any process exists.
    pub fn new(commands: usize) -> Result<Self, ShellError> {
        let count = commands.saturating_sub(1);
        let mut links = Vec::with_capacity(count);

        for _ in 0..count {
            let (reader, writer) = os_pipe::pipe().map_err(|source| ShellError::Resource {
                context: "pipe",
                source,
            })?;
            links.push(Link {
                reader: Some(reader),
                writer: Some(writer),
            });
        }

        Ok(Self { links })
    }

    /// Read end feeding command `position`, or `None` for the first command.
    pub fn take_stdin(&mut self, position: usize) -> Option<PipeReader> {
        let index = position.checked_sub(1)?;
        self.links.get_mut(index)?.reader.take()
    }

    /// Write end fed by command `position`, or `None` for the last command.
    pub fn take_stdout(&mut self, position: usize) -> Option<PipeWriter> {
        self.links.get_mut(position)?.writer.take()
    }

    /// Close both ends belonging to a command that will not run as a process,
    /// so its neighbours see EOF instead of blocking.
    pub fn release(&mut self, position: usize) {
        drop(self.take_stdin(position));
        drop(self.take_stdout(position));
    }

    /// Number of pipe ends still held by the shell.
    #[cfg(test)]
    fn open_ends(&self) -> usize {
        self.links
            .iter()
            .map(|link| link.reader.is_some() as usize + link.writer.is_some() as usize)
            .sum()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.links.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

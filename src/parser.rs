use crate::command::{Command, Pipeline, Sequence};
use crate::error::ParseError;

/// Split one line of input into a [`Sequence`] of pipelines.
///
/// This is deliberately mechanical: `;` and `&` end a pipeline (`&` marks it
/// as background), `|` separates commands, and whitespace separates words.
/// There is no quoting, expansion or globbing.
pub fn parse_sequence(line: &str) -> Result<Sequence, ParseError> {
    let mut sequence = Sequence::new();
    let mut segment = String::new();

    for ch in line.chars() {
        match ch {
            ';' | '&' => {
                let background = ch == '&';
                let text = std::mem::take(&mut segment);
                if text.trim().is_empty() {
                    // A bare `;` is harmless; `&` with nothing before it is not.
                    if background {
                        return Err(ParseError::UnexpectedToken(ch));
                    }
                    continue;
                }
                sequence.push(parse_pipeline(&text, background)?);
            }
            c => segment.push(c),
        }
    }

    if !segment.trim().is_empty() {
        sequence.push(parse_pipeline(&segment, false)?);
    }

    Ok(sequence)
}

/// Split one pipeline's text on `|` into commands.
pub fn parse_pipeline(text: &str, background: bool) -> Result<Pipeline, ParseError> {
    let source = text.trim();
    let pieces: Vec<&str> = source.split('|').collect();
    let count = pieces.len();

    let mut commands = Vec::with_capacity(count);
    for (position, piece) in pieces.into_iter().enumerate() {
        let words: Vec<String> = piece.split_whitespace().map(str::to_string).collect();
        let command = Command::new(words, position, position + 1 == count)
            .ok_or_else(|| ParseError::EmptyCommand(source.to_string()))?;
        commands.push(command);
    }

    Ok(Pipeline::new(commands, background, source))
}

/// Marks a whole-line comment in a bulk file.
pub const COMMENT_MARKER: char = '#';

/// One line of a bulk file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    Blank,
    Comment,
    Command { name: String, args: Vec<String> },
}

impl CommandLine {
    /// Tokenize `line` with shell quoting rules.
    ///
    /// A trailing `# ...` after a command is dropped like in a shell. Errors
    /// carry a human readable reason (unterminated quote and the like).
    pub fn parse(line: &str) -> Result<Self, String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(CommandLine::Blank);
        }
        if trimmed.starts_with(COMMENT_MARKER) {
            return Ok(CommandLine::Comment);
        }

        let mut words = shell_words::split(trimmed).map_err(|e| e.to_string())?.into_iter();
        let name = words.next().ok_or_else(|| "No command specified".to_string())?;
        Ok(CommandLine::Command {
            name,
            args: words.collect(),
        })
    }

    pub fn is_command(&self) -> bool {
        matches!(self, CommandLine::Command { .. })
    }
}

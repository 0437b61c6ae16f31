use thiserror::Error;

/// A line typed at the chat prompt.
///
/// Conversation numbers are 1-based as shown by `/list`; the parsed indexes
/// are 0-based. A leading `//` sends the rest of the line, one slash
/// stripped, as a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    List,
    Show,
    New,
    Select(usize),
    Rename(usize, String),
    Delete(usize),
    Prompt(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),
    #[error("/{0} needs {1}")]
    MissingArgument(&'static str, &'static str),
    #[error("not a conversation number: {0}")]
    InvalidIndex(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let Some(rest) = line.trim_start().strip_prefix('/') else {
            return Ok(Self::Prompt(line.to_string()));
        };
        if rest.starts_with('/') {
            return Ok(Self::Prompt(rest.to_string()));
        }

        let (name, args) = match rest.trim().split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest.trim(), ""),
        };

        match name {
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            "list" => Ok(Self::List),
            "show" => Ok(Self::Show),
            "new" => Ok(Self::New),
            "select" => Ok(Self::Select(parse_index("select", args)?)),
            "delete" => Ok(Self::Delete(parse_index("delete", args)?)),
            "rename" => {
                let (index, new_name) = args
                    .split_once(char::is_whitespace)
                    .map(|(index, new_name)| (index, new_name.trim()))
                    .ok_or(CommandError::MissingArgument("rename", "a number and a new name"))?;
                if new_name.is_empty() {
                    return Err(CommandError::MissingArgument("rename", "a number and a new name"));
                }
                Ok(Self::Rename(parse_index("rename", index)?, new_name.to_string()))
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_index(command: &'static str, arg: &str) -> Result<usize, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingArgument(command, "a conversation number"));
    }
    match arg.parse::<usize>() {
        Ok(number) if number > 0 => Ok(number - 1),
        _ => Err(CommandError::InvalidIndex(arg.to_string())),
    }
}

use rustyline::{Config, Editor, Result};

/// Prompt shown before each line, tagged with the open conversation if any.
pub fn generate_prompt(conversation: Option<&str>) -> String {
    match conversation {
        Some(name) => format!("[{name}] > "),
        None => "> ".to_string(),
    }
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(rustyline::CompletionType::List)
        .build();
    Editor::with_config(config)
}

pub mod command;
pub mod conversation_state;
pub mod history;
pub mod prompt;
pub mod relay_client;

use std::collections::VecDeque;
use std::io::Write;
use std::process::ExitCode;

use chrono::{Local, Utc};
use color_print::cwriteln;
use command::Command;
use conversation_state::{ConversationState, Effect, Event, Phase};
use crossterm::cursor::MoveToColumn;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use eyre::Result;
use history::{HistoryStore, Message, MessageKind};
use prompt::generate_prompt;
use relay_client::{fetch_reply, RelayClient};
use rustyline::error::ReadlineError;
use tracing::{debug, error};

const WELCOME_TEXT: &str = "
Welcome to ChatBot, your Mistral-powered assistant. Ask me anything.

/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
Mistral Chat

/list               List saved conversations
/select N           Open conversation N
/rename N NAME      Rename conversation N
/delete N           Delete conversation N
/new                Start a new conversation
/show               Print the open conversation again
/help               Show this help dialogue
/quit               Quit the application
//TEXT              Send TEXT starting with a slash as a message
";

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    conversation_state: ConversationState,
    store: Box<dyn HistoryStore>,
    relay: Box<dyn RelayClient>,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        store: Box<dyn HistoryStore>,
        relay: Box<dyn RelayClient>,
    ) -> Self {
        let history = store.load();
        debug!(conversations = history.len(), "loaded chat history");

        Self {
            output,
            input,
            interactive,
            conversation_state: ConversationState::new(history),
            store,
            relay,
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        // Handle non-interactive mode (single message)
        if let Some(input) = self.input.take() {
            self.send_message(input).await?;
            return Ok(ExitCode::SUCCESS);
        }

        if self.interactive {
            writeln!(self.output, "{}", WELCOME_TEXT)?;
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let prompt_text = generate_prompt(
                self.conversation_state
                    .selected_conversation()
                    .map(|conversation| conversation.display_name()),
            );

            match rl.readline(&prompt_text) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str());

                    if !self.handle_input(&line).await? {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handles one prompt line. Returns `false` once the user asked to quit.
    async fn handle_input(&mut self, line: &str) -> Result<bool> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                cwriteln!(self.output, "<yellow>{}</>", e)?;
                return Ok(true);
            }
        };

        match command {
            Command::Quit => return Ok(false),
            Command::Help => writeln!(self.output, "{}", HELP_TEXT)?,
            Command::List => self.print_history()?,
            Command::Show => self.print_transcript()?,
            Command::New => {
                self.dispatch(Event::NewChat).await?;
                writeln!(self.output, "Started a new conversation.")?;
            }
            Command::Select(index) => {
                self.dispatch(Event::Select(index)).await?;
                if self.conversation_state.selected() == Some(index) {
                    self.print_transcript()?;
                } else {
                    self.no_such_conversation(index)?;
                }
            }
            Command::Rename(index, name) => {
                self.dispatch(Event::BeginRename(index)).await?;
                if self.conversation_state.editing().is_none() {
                    return self.no_such_conversation(index).map(|_| true);
                }
                self.dispatch(Event::EditRename(name)).await?;
                self.dispatch(Event::CommitRename).await?;
            }
            Command::Delete(index) => {
                let before = self.conversation_state.history().len();
                self.dispatch(Event::Delete(index)).await?;
                if self.conversation_state.history().len() == before {
                    self.no_such_conversation(index)?;
                }
            }
            Command::Prompt(text) => self.send_message(text).await?,
        }

        Ok(true)
    }

    async fn send_message(&mut self, text: String) -> Result<()> {
        self.dispatch(Event::SetInput(text)).await?;
        self.dispatch(Event::Submit).await
    }

    /// Feeds `event` to the state machine and carries out every resulting effect.
    async fn dispatch(&mut self, event: Event) -> Result<()> {
        let mut effects: VecDeque<Effect> = self.conversation_state.handle(event, Utc::now()).into();

        while let Some(effect) = effects.pop_front() {
            match effect {
                Effect::CallRelay(text) => {
                    debug_assert_eq!(self.conversation_state.phase(), Phase::AwaitingReply);
                    if !self.interactive {
                        self.print_last_message()?;
                    }

                    write!(self.output, "Thinking...")?;
                    self.output.flush()?;
                    let reply = fetch_reply(self.relay.as_ref(), &text).await;
                    execute!(self.output, MoveToColumn(0), Clear(ClearType::CurrentLine))?;

                    effects.extend(
                        self.conversation_state
                            .handle(Event::RelayReturned(reply), Utc::now()),
                    );
                    self.print_last_message()?;
                }
                Effect::Persist => self.persist()?,
            }
        }

        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        if let Err(e) = self.store.save(self.conversation_state.history()) {
            error!("failed to save chat history: {e}");
            cwriteln!(self.output, "<red>Could not save chat history: {}</>", e)?;
        }
        Ok(())
    }

    fn print_last_message(&mut self) -> Result<()> {
        if let Some(message) = self.conversation_state.transcript().last().cloned() {
            self.print_message(&message)?;
        }
        Ok(())
    }

    fn print_message(&mut self, message: &Message) -> Result<()> {
        let time = message.created_at().with_timezone(&Local).format("%H:%M:%S");
        match message.kind() {
            MessageKind::Request => {
                cwriteln!(self.output, "<magenta,bold>You</> <dim>{}</>", time)?;
            }
            MessageKind::Response => {
                cwriteln!(self.output, "<blue,bold>ChatBot</> <dim>{}</>", time)?;
            }
        }
        writeln!(self.output, "{}\n", message.text())?;
        Ok(())
    }

    fn print_transcript(&mut self) -> Result<()> {
        let transcript = self.conversation_state.transcript().to_vec();
        if transcript.is_empty() {
            writeln!(self.output, "No messages yet.")?;
        }
        for message in &transcript {
            self.print_message(message)?;
        }
        Ok(())
    }

    fn print_history(&mut self) -> Result<()> {
        let history = self.conversation_state.history();
        if history.is_empty() {
            writeln!(self.output, "No saved conversations.")?;
            return Ok(());
        }

        let selected = self.conversation_state.selected();
        let lines: Vec<String> = history
            .iter()
            .enumerate()
            .map(|(index, conversation)| {
                let marker = if selected == Some(index) { "*" } else { " " };
                format!(
                    "{marker} {:>3}. {} ({} messages)",
                    index + 1,
                    conversation.display_name(),
                    conversation.messages().len()
                )
            })
            .collect();

        for line in lines {
            writeln!(self.output, "{}", line)?;
        }
        Ok(())
    }

    fn no_such_conversation(&mut self, index: usize) -> Result<()> {
        cwriteln!(self.output, "<yellow>No conversation {} (see /list)</>", index + 1)?;
        Ok(())
    }
}

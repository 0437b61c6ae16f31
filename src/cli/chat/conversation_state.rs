//! Chat state machine: active transcript, input buffer and history.
//!
//! Every user action and every relay result enters through
//! [`ConversationState::handle`], which mutates the state and returns the
//! side effects the caller has to perform. Rendering and I/O stay outside.

use chrono::{DateTime, Local, Utc};
use tracing::debug;

use super::history::{Conversation, History, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingReply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Replace the input buffer.
    SetInput(String),
    /// Send the input buffer as a new turn.
    Submit,
    /// The relay call of the in-flight turn resolved (reply or fallback text).
    RelayReturned(String),
    Select(usize),
    /// Open the rename buffer for a conversation, prefilled with its name.
    BeginRename(usize),
    EditRename(String),
    CommitRename,
    CancelRename,
    Rename(usize, String),
    Delete(usize),
    /// Leave the selected conversation so the next submit starts a new one.
    NewChat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Call the relay with this text and feed the result back as
    /// [`Event::RelayReturned`].
    CallRelay(String),
    /// Save the full history snapshot.
    Persist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameEdit {
    pub index: usize,
    pub value: String,
}

pub struct ConversationState {
    input: String,
    transcript: Vec<Message>,
    history: History,
    selected: Option<usize>,
    editing: Option<RenameEdit>,
    /// Request of the turn in flight; `Some` means [`Phase::AwaitingReply`].
    pending: Option<Message>,
}

impl ConversationState {
    pub fn new(history: History) -> Self {
        Self {
            input: String::new(),
            transcript: Vec::new(),
            history,
            selected: None,
            editing: None,
            pending: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.pending.is_some() {
            Phase::AwaitingReply
        } else {
            Phase::Idle
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn history(&self) -> &[Conversation] {
        &self.history
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        self.selected.and_then(|index| self.history.get(index))
    }

    pub fn editing(&self) -> Option<&RenameEdit> {
        self.editing.as_ref()
    }

    pub fn handle(&mut self, event: Event, now: DateTime<Utc>) -> Vec<Effect> {
        match event {
            Event::SetInput(text) => {
                self.input = text;
                Vec::new()
            }
            Event::Submit => self.submit(now),
            Event::RelayReturned(reply) => self.complete_turn(reply, now),
            Event::Select(index) => self.select(index),
            Event::BeginRename(index) => {
                if self.idle_with(index, "rename") {
                    self.editing = Some(RenameEdit {
                        index,
                        value: self.history[index].display_name().to_string(),
                    });
                }
                Vec::new()
            }
            Event::EditRename(value) => {
                if let Some(edit) = self.editing.as_mut() {
                    edit.value = value;
                }
                Vec::new()
            }
            Event::CommitRename => {
                // The edit buffer survives until a commit can apply it.
                if self.phase() == Phase::AwaitingReply {
                    debug!("holding rename edit while a reply is pending");
                    return Vec::new();
                }
                match self.editing.take() {
                    Some(edit) => self.rename(edit.index, edit.value),
                    None => Vec::new(),
                }
            }
            Event::CancelRename => {
                self.editing = None;
                Vec::new()
            }
            Event::Rename(index, name) => self.rename(index, name),
            Event::Delete(index) => self.delete(index),
            Event::NewChat => {
                if self.phase() == Phase::Idle {
                    self.transcript.clear();
                    self.selected = None;
                    self.editing = None;
                }
                Vec::new()
            }
        }
    }

    fn submit(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        if self.phase() == Phase::AwaitingReply {
            debug!("dropping submit while a reply is pending");
            return Vec::new();
        }
        if self.input.trim().is_empty() {
            return Vec::new();
        }

        let text = std::mem::take(&mut self.input);
        let request = Message::request(text.clone(), now);
        self.transcript.push(request.clone());
        self.pending = Some(request);

        vec![Effect::CallRelay(text)]
    }

    fn complete_turn(&mut self, reply: String, now: DateTime<Utc>) -> Vec<Effect> {
        let Some(request) = self.pending.take() else {
            debug!("discarding relay result with no turn in flight");
            return Vec::new();
        };

        let response = Message::response(reply, now);
        self.transcript.push(response.clone());

        match self.selected.and_then(|index| self.history.get_mut(index)) {
            Some(conversation) => conversation.push_turn(request, response),
            None => {
                let name = chat_name(now);
                self.history.push(Conversation::new(name, vec![request, response]));
                self.selected = Some(self.history.len() - 1);
            }
        }

        vec![Effect::Persist]
    }

    fn select(&mut self, index: usize) -> Vec<Effect> {
        if self.idle_with(index, "select") {
            self.transcript = self.history[index].messages().to_vec();
            self.selected = Some(index);
            self.editing = None;
        }
        Vec::new()
    }

    fn rename(&mut self, index: usize, name: String) -> Vec<Effect> {
        if !self.idle_with(index, "rename") {
            return Vec::new();
        }
        self.history[index].rename(name);
        vec![Effect::Persist]
    }

    fn delete(&mut self, index: usize) -> Vec<Effect> {
        if !self.idle_with(index, "delete") {
            return Vec::new();
        }
        self.history.remove(index);

        self.selected = match self.selected {
            Some(selected) if selected == index => {
                self.transcript.clear();
                None
            }
            Some(selected) if selected > index => Some(selected - 1),
            other => other,
        };

        self.editing = match self.editing.take() {
            Some(edit) if edit.index == index => None,
            Some(edit) if edit.index > index => Some(RenameEdit {
                index: edit.index - 1,
                ..edit
            }),
            other => other,
        };

        vec![Effect::Persist]
    }

    /// History operations need an idle client and an existing entry.
    fn idle_with(&self, index: usize, operation: &str) -> bool {
        if self.phase() == Phase::AwaitingReply {
            debug!("ignoring {operation} while a reply is pending");
            return false;
        }
        if index >= self.history.len() {
            debug!("ignoring {operation} of missing conversation {index}");
            return false;
        }
        true
    }
}

fn chat_name(now: DateTime<Utc>) -> String {
    format!("Chat {}", now.with_timezone(&Local).format("%d/%m/%Y, %H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::cli::chat::history::{HistoryStore, MemoryStore, MessageKind};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn submit(state: &mut ConversationState, text: &str) -> Vec<Effect> {
        state.handle(Event::SetInput(text.to_string()), t0());
        state.handle(Event::Submit, t0())
    }

    fn turn(state: &mut ConversationState, text: &str, reply: &str) {
        submit(state, text);
        state.handle(Event::RelayReturned(reply.to_string()), t0() + Duration::seconds(1));
    }

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(Message::text).collect()
    }

    /// Two saved conversations, nothing selected.
    fn state_with_two_chats() -> ConversationState {
        let mut state = ConversationState::new(History::new());
        turn(&mut state, "first", "one");
        state.handle(Event::NewChat, t0());
        turn(&mut state, "second", "two");
        state.handle(Event::NewChat, t0());
        state
    }

    #[test]
    fn submit_appends_request_and_awaits_reply() {
        let mut state = ConversationState::new(History::new());

        let effects = submit(&mut state, "Hello");

        assert_eq!(effects, vec![Effect::CallRelay("Hello".to_string())]);
        assert_eq!(state.phase(), Phase::AwaitingReply);
        assert_eq!(state.transcript().len(), 1);
        assert_eq!(state.transcript()[0].text(), "Hello");
        assert_eq!(state.transcript()[0].kind(), MessageKind::Request);
        assert_eq!(state.input(), "");
    }

    #[test]
    fn blank_input_is_not_submitted() {
        let mut state = ConversationState::new(History::new());

        for blank in ["", "   ", "\t\n"] {
            assert!(submit(&mut state, blank).is_empty());
            assert_eq!(state.phase(), Phase::Idle);
        }
        assert!(state.transcript().is_empty());
    }

    #[test]
    fn submit_while_awaiting_reply_is_dropped() {
        let mut state = ConversationState::new(History::new());
        submit(&mut state, "Hello");

        let effects = submit(&mut state, "Are you there?");

        assert!(effects.is_empty());
        assert_eq!(state.transcript().len(), 1);
        assert_eq!(state.phase(), Phase::AwaitingReply);
    }

    #[test]
    fn first_turn_creates_and_selects_conversation() {
        let mut state = ConversationState::new(History::new());
        submit(&mut state, "Hello");

        let effects = state.handle(Event::RelayReturned("Hi!".to_string()), t0());

        assert_eq!(effects, vec![Effect::Persist]);
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(texts(state.transcript()), ["Hello", "Hi!"]);
        assert_eq!(state.transcript()[1].kind(), MessageKind::Response);
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history()[0].messages(), state.transcript());
        assert!(state.history()[0].display_name().starts_with("Chat "));
        assert_eq!(state.selected(), Some(0));
    }

    #[test]
    fn later_turns_extend_selected_conversation() {
        let mut state = ConversationState::new(History::new());
        turn(&mut state, "Hello", "Hi!");

        let before = state.transcript().len();
        turn(&mut state, "How are you?", "Fine.");

        assert_eq!(state.transcript().len(), before + 2);
        assert_eq!(state.history().len(), 1);
        assert_eq!(
            texts(state.history()[0].messages()),
            ["Hello", "Hi!", "How are you?", "Fine."]
        );
    }

    #[test]
    fn fallback_reply_still_completes_turn() {
        let mut state = ConversationState::new(History::new());
        submit(&mut state, "Hello");

        state.handle(Event::RelayReturned("Sorry, AI is unavailable.".to_string()), t0());

        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.transcript().len(), 2);
        assert_eq!(state.transcript()[1].text(), "Sorry, AI is unavailable.");
    }

    #[test]
    fn relay_result_without_pending_turn_is_ignored() {
        let mut state = ConversationState::new(History::new());

        let effects = state.handle(Event::RelayReturned("late".to_string()), t0());

        assert!(effects.is_empty());
        assert!(state.transcript().is_empty());
        assert!(state.history().is_empty());
    }

    #[test]
    fn select_replaces_transcript() {
        let mut state = state_with_two_chats();

        state.handle(Event::Select(0), t0());

        assert_eq!(state.selected(), Some(0));
        assert_eq!(texts(state.transcript()), ["first", "one"]);

        turn(&mut state, "again", "still one");
        assert_eq!(state.history()[0].messages().len(), 4);
        assert_eq!(state.history()[1].messages().len(), 2);
    }

    #[test]
    fn history_operations_wait_for_idle() {
        let mut state = state_with_two_chats();
        state.handle(Event::Select(1), t0());
        submit(&mut state, "pending");

        assert!(state.handle(Event::Select(0), t0()).is_empty());
        assert!(state.handle(Event::Rename(0, "x".to_string()), t0()).is_empty());
        assert!(state.handle(Event::Delete(0), t0()).is_empty());
        state.handle(Event::NewChat, t0());

        assert_eq!(state.selected(), Some(1));
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.transcript().len(), 3);

        state.handle(Event::RelayReturned("done".to_string()), t0());
        assert_eq!(state.history()[1].messages().len(), 4);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut state = state_with_two_chats();

        assert!(state.handle(Event::Select(5), t0()).is_empty());
        assert!(state.handle(Event::Rename(2, "x".to_string()), t0()).is_empty());
        assert!(state.handle(Event::Delete(9), t0()).is_empty());
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.selected(), None);
    }

    #[test]
    fn rename_changes_only_the_name() {
        let mut state = state_with_two_chats();

        let effects = state.handle(Event::Rename(1, "Renamed".to_string()), t0());

        assert_eq!(effects, vec![Effect::Persist]);
        assert_eq!(state.history()[1].display_name(), "Renamed");
        assert_eq!(texts(state.history()[1].messages()), ["second", "two"]);
    }

    #[test]
    fn rename_edit_flow_commits_buffer() {
        let mut state = state_with_two_chats();
        let original = state.history()[0].display_name().to_string();

        state.handle(Event::BeginRename(0), t0());
        assert_eq!(
            state.editing(),
            Some(&RenameEdit {
                index: 0,
                value: original
            })
        );

        state.handle(Event::EditRename("Greetings".to_string()), t0());
        let effects = state.handle(Event::CommitRename, t0());

        assert_eq!(effects, vec![Effect::Persist]);
        assert_eq!(state.editing(), None);
        assert_eq!(state.history()[0].display_name(), "Greetings");
    }

    #[test]
    fn commit_while_awaiting_reply_keeps_edit() {
        let mut state = state_with_two_chats();
        state.handle(Event::Select(0), t0());
        state.handle(Event::BeginRename(0), t0());
        state.handle(Event::EditRename("Greetings".to_string()), t0());
        submit(&mut state, "still there?");
        assert_eq!(state.phase(), Phase::AwaitingReply);

        assert!(state.handle(Event::CommitRename, t0()).is_empty());
        assert_eq!(
            state.editing(),
            Some(&RenameEdit {
                index: 0,
                value: "Greetings".to_string()
            })
        );
        assert_ne!(state.history()[0].display_name(), "Greetings");

        state.handle(Event::RelayReturned("yes".to_string()), t0());
        let effects = state.handle(Event::CommitRename, t0());

        assert_eq!(effects, vec![Effect::Persist]);
        assert_eq!(state.editing(), None);
        assert_eq!(state.history()[0].display_name(), "Greetings");
    }

    #[test]
    fn cancelled_rename_keeps_name() {
        let mut state = state_with_two_chats();
        let original = state.history()[0].display_name().to_string();

        state.handle(Event::BeginRename(0), t0());
        state.handle(Event::EditRename("Nope".to_string()), t0());
        state.handle(Event::CancelRename, t0());

        assert!(state.handle(Event::CommitRename, t0()).is_empty());
        assert_eq!(state.history()[0].display_name(), original);
    }

    #[test]
    fn select_clears_rename_edit() {
        let mut state = state_with_two_chats();
        state.handle(Event::BeginRename(0), t0());

        state.handle(Event::Select(1), t0());

        assert_eq!(state.editing(), None);
    }

    #[test]
    fn deleting_selected_conversation_resets_transcript() {
        let mut state = state_with_two_chats();
        state.handle(Event::Select(1), t0());

        let effects = state.handle(Event::Delete(1), t0());

        assert_eq!(effects, vec![Effect::Persist]);
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.selected(), None);
        assert!(state.transcript().is_empty());
    }

    #[test]
    fn deleting_other_conversation_keeps_selection_on_same_chat() {
        let mut state = state_with_two_chats();
        state.handle(Event::Select(1), t0());

        state.handle(Event::Delete(0), t0());

        assert_eq!(state.history().len(), 1);
        assert_eq!(state.selected(), Some(0));
        assert_eq!(texts(state.transcript()), ["second", "two"]);
        assert_eq!(state.selected_conversation(), Some(&state.history()[0]));
    }

    #[test]
    fn new_chat_starts_fresh_conversation_on_next_turn() {
        let mut state = ConversationState::new(History::new());
        turn(&mut state, "Hello", "Hi!");

        state.handle(Event::NewChat, t0());
        assert!(state.transcript().is_empty());
        assert_eq!(state.selected(), None);

        turn(&mut state, "New topic", "Sure");
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.selected(), Some(1));
    }

    #[test]
    fn persisted_history_reloads_into_new_session() {
        let store = MemoryStore::default();
        let mut state = state_with_two_chats();
        state.handle(Event::Rename(0, "Kept name".to_string()), t0());
        store.save(state.history()).unwrap();

        let reloaded = ConversationState::new(store.load());

        assert_eq!(reloaded.history(), state.history());
        assert_eq!(reloaded.history()[0].display_name(), "Kept name");
        assert_eq!(reloaded.selected(), None);
        assert!(reloaded.transcript().is_empty());
    }
}

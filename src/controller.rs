//! Chat state machine: idle ⇄ sending, with the typing indicator active only
//! while a reply is pending. Pure state; the UI layer translates events into
//! these calls and draws the result.

use crate::history::{InputHistory, NavOutcome};
use crate::i18n::{Lang, Locale, Strings};
use crate::transcript::{LogStore, Message, Role};
use crate::wire::{Inbound, InboundKind};

pub struct ChatController {
    log: Vec<Message>,
    input_history: InputHistory,
    sending: bool,
    store: Box<dyn LogStore>,
    locale: Locale,
}

impl ChatController {
    /// Rebuilds the transcript from the store.
    pub fn new(store: Box<dyn LogStore>, locale: Locale) -> Self {
        let log = store.load();
        Self {
            log,
            input_history: InputHistory::new(),
            sending: false,
            store,
            locale,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.log
    }

    /// True while a reply is pending; the typing indicator is shown.
    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn language(&self) -> Lang {
        self.locale.current()
    }

    pub fn strings(&self) -> &'static Strings {
        self.locale.strings()
    }

    /// No-op when `lang` is already active. Returns true when the UI needs
    /// to recompute localized chrome (status label, placeholder).
    pub fn switch_language(&mut self, lang: Lang) -> bool {
        self.locale.switch(lang)
    }

    /// Accept a submitted buffer. Whitespace-only input is ignored. On
    /// success the trimmed text is returned for the send path and the user
    /// message is already displayed and persisted.
    pub fn submit(&mut self, buffer: &str) -> Option<String> {
        let text = buffer.trim();
        if text.is_empty() {
            return None;
        }
        self.input_history.submit(text);
        self.append(Message::new(Role::User, text));
        self.sending = true;
        Some(text.to_string())
    }

    pub fn navigate_history(&mut self, direction: i32) -> NavOutcome {
        self.input_history.navigate(direction)
    }

    /// Inbound reply from either transport.
    pub fn on_inbound(&mut self, inbound: Inbound) {
        self.sending = false;
        let role = match inbound.kind {
            InboundKind::Assistant => Role::Assistant,
            InboundKind::Error => Role::Error,
        };
        self.append(Message::new(role, inbound.content));
    }

    /// Send path failed on both transports: one localized error entry, no
    /// automatic retry.
    pub fn on_send_failure(&mut self) {
        self.sending = false;
        let text = self.strings().send_failed;
        self.append(Message::new(Role::Error, text));
    }

    fn append(&mut self, message: Message) {
        self.log.push(message);
        self.store.persist(&self.log);
    }
}

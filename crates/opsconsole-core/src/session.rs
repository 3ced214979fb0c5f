/// Per-page conversation state.
///
/// One instance lives for the lifetime of the console and is handed by
/// reference to whichever component needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationSession {
    last_message_id: u64,
    show_debug: bool,
    is_sending: bool,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest message id rendered so far.
    pub fn last_message_id(&self) -> u64 {
        self.last_message_id
    }

    pub fn show_debug(&self) -> bool {
        self.show_debug
    }

    pub fn is_sending(&self) -> bool {
        self.is_sending
    }

    /// Move the cursor forward to `id`. Never moves it back.
    pub(crate) fn advance_cursor(&mut self, id: u64) -> bool {
        if id > self.last_message_id {
            self.last_message_id = id;
            true
        } else {
            false
        }
    }

    pub(crate) fn reset_cursor(&mut self) {
        self.last_message_id = 0;
    }

    pub(crate) fn set_show_debug(&mut self, show: bool) {
        self.show_debug = show;
    }

    pub(crate) fn set_sending(&mut self, sending: bool) {
        self.is_sending = sending;
    }
}

//! The rendered console surface.
//!
//! `ConsoleView` stands in for the page: the message log (keyed by element
//! id), the single live action block, the input field and its lock, the
//! typing indicator, one transient notification and the prompt editor. Front
//! ends read it to draw; only the sync engine and the controller write it.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::actions::{ActionBlock, ActionCard};
use crate::markdown::{escape_html, render_markdown, render_plain};
use crate::state::{ChatRole, Message};

pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleKind {
    /// Conversation text, either synced or waiting to be matched by a sync.
    Message,
    /// Server-reported failure shown inline.
    Error,
    /// Output of an executed action.
    Result,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bubble {
    /// `msg-{id}` once bound to a server message, `None` while provisional.
    pub element_id: Option<String>,
    pub role: ChatRole,
    pub kind: BubbleKind,
    /// Raw text the bubble was rendered from.
    pub source: String,
    pub html: String,
}

impl Bubble {
    pub fn is_provisional(&self) -> bool {
        self.element_id.is_none() && self.kind == BubbleKind::Message
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub is_error: bool,
    shown_at: Instant,
}

impl Notification {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.shown_at) >= NOTIFICATION_TTL
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptEditor {
    pub open: bool,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct ConsoleView {
    bubbles: Vec<Bubble>,
    element_ids: HashSet<String>,
    action_block: Option<ActionBlock>,
    action_generation: u64,
    /// Contents of the message input field.
    pub input: String,
    input_locked: bool,
    typing: bool,
    notification: Option<Notification>,
    pub prompt_editor: PromptEditor,
    debug_checked: bool,
    scroll_generation: u64,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn contains(&self, element_id: &str) -> bool {
        self.element_ids.contains(element_id)
    }

    /// Insert a server message at most once.
    ///
    /// A provisional bubble with the same role and text adopts the id instead
    /// of a second bubble being appended. Returns whether the log changed.
    pub fn merge_message(&mut self, msg: &Message, show_debug: bool) -> bool {
        let element_id = msg.element_id();
        if self.element_ids.contains(&element_id) {
            return false;
        }

        let provisional = self
            .bubbles
            .iter_mut()
            .find(|b| b.is_provisional() && b.role == msg.role && echoes(&b.source, &msg.content));
        match provisional {
            Some(bubble) => bubble.element_id = Some(element_id.clone()),
            None => {
                let debug = msg.debug.as_ref().filter(|_| show_debug);
                self.bubbles.push(Bubble {
                    element_id: Some(element_id.clone()),
                    role: msg.role,
                    kind: BubbleKind::Message,
                    source: msg.content.clone(),
                    html: message_html(msg.role, &msg.content, debug),
                });
            }
        }
        self.element_ids.insert(element_id);
        true
    }

    /// Whether a sync already bound `reply` after the newest user message.
    pub fn has_synced_reply(&self, reply: &str) -> bool {
        self.bubbles
            .iter()
            .rev()
            .take_while(|b| !(b.kind == BubbleKind::Message && b.role == ChatRole::User))
            .any(|b| {
                b.kind == BubbleKind::Message
                    && b.role == ChatRole::Assistant
                    && b.element_id.is_some()
                    && echoes(reply, &b.source)
            })
    }

    /// Append a locally produced message that the server has not echoed yet.
    pub fn push_provisional(&mut self, role: ChatRole, content: &str, debug: Option<&Value>) {
        self.bubbles.push(Bubble {
            element_id: None,
            role,
            kind: BubbleKind::Message,
            source: content.to_string(),
            html: message_html(role, content, debug),
        });
    }

    /// Server-reported failure as an assistant-role bubble.
    pub fn push_error(&mut self, error: &str) {
        let source = format!("Error: {}", error);
        self.bubbles.push(Bubble {
            element_id: None,
            role: ChatRole::Assistant,
            kind: BubbleKind::Error,
            html: format!(
                "<div class=\"msg-content msg-error\">{}</div>",
                escape_html(&source)
            ),
            source,
        });
    }

    /// Output of an executed action. `details` adds the collapsible
    /// execution section shown in debug mode.
    pub fn push_result(&mut self, target: &str, output: &str, details: Option<&[(&str, String)]>) {
        let mut html = format!(
            "<div class=\"msg-content\"><strong>Result ({}):</strong><pre><code>{}</code></pre>",
            escape_html(target),
            escape_html(output)
        );
        let mut source = format!("Result ({}):\n{}", target, output);
        if let Some(rows) = details {
            html.push_str("<details class=\"debug-details\"><summary>Details</summary>");
            for (label, value) in rows {
                html.push_str(&format!(
                    "<p>{}: {}</p>",
                    escape_html(label),
                    escape_html(value)
                ));
                source.push_str(&format!("\n{}: {}", label, value));
            }
            html.push_str("</details>");
        }
        html.push_str("</div>");
        self.bubbles.push(Bubble {
            element_id: None,
            role: ChatRole::Assistant,
            kind: BubbleKind::Result,
            source,
            html,
        });
    }

    pub fn action_block(&self) -> Option<&ActionBlock> {
        self.action_block.as_ref()
    }

    /// Bumped every time a different action batch is displayed.
    pub fn action_generation(&self) -> u64 {
        self.action_generation
    }

    /// Show `block` in place of the current one (`None` removes it).
    ///
    /// Re-delivery of the very same batch keeps the existing cards so an
    /// executed card stays done.
    pub fn replace_actions(&mut self, block: Option<ActionBlock>) {
        if let (Some(current), Some(next)) = (&self.action_block, &block) {
            if current.raw_json() == next.raw_json() {
                return;
            }
        }
        if self.action_block.is_none() && block.is_none() {
            return;
        }
        self.action_block = block;
        self.action_generation += 1;
    }

    /// Card lookup that only succeeds while the same batch is still shown.
    pub fn card_mut(&mut self, generation: u64, index: usize) -> Option<&mut ActionCard> {
        if generation != self.action_generation {
            return None;
        }
        self.action_block.as_mut()?.card_mut(index)
    }

    /// Wipe the whole log, action block included.
    pub fn clear_log(&mut self) {
        self.bubbles.clear();
        self.element_ids.clear();
        self.replace_actions(None);
        self.scroll_to_bottom();
    }

    pub fn input_locked(&self) -> bool {
        self.input_locked
    }

    pub fn set_input_locked(&mut self, locked: bool) {
        self.input_locked = locked;
    }

    pub fn typing(&self) -> bool {
        self.typing
    }

    pub fn set_typing(&mut self, typing: bool) {
        self.typing = typing;
    }

    pub fn debug_checked(&self) -> bool {
        self.debug_checked
    }

    pub fn set_debug_checked(&mut self, checked: bool) {
        self.debug_checked = checked;
    }

    /// Show a transient notice, replacing any previous one.
    pub fn notify(&mut self, text: impl Into<String>, is_error: bool) {
        self.notification = Some(Notification {
            text: text.into(),
            is_error,
            shown_at: Instant::now(),
        });
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn expire_notification(&mut self, now: Instant) {
        if self.notification.as_ref().is_some_and(|n| n.is_expired(now)) {
            self.notification = None;
        }
    }

    /// Ask the front end to pin the log to its newest entry.
    pub fn scroll_to_bottom(&mut self) {
        self.scroll_generation += 1;
    }

    /// Changes whenever [`scroll_to_bottom`](Self::scroll_to_bottom) is requested.
    pub fn scroll_generation(&self) -> u64 {
        self.scroll_generation
    }
}

/// Whether a provisional bubble shows `content`, possibly behind a notice
/// the server put in front of the reply it returned directly.
fn echoes(provisional: &str, content: &str) -> bool {
    provisional == content
        || (!content.is_empty() && provisional.ends_with(&format!("\n\n{}", content)))
}

fn message_html(role: ChatRole, content: &str, debug: Option<&Value>) -> String {
    let body = if role.uses_markdown() {
        render_markdown(content)
    } else {
        render_plain(content)
    };
    let mut html = format!("<div class=\"msg-content\">{}", body);
    if let Some(debug) = debug {
        let pretty = serde_json::to_string_pretty(debug).unwrap_or_else(|_| debug.to_string());
        html.push_str(&format!(
            "<details class=\"debug-details\"><summary>Debug</summary><pre>{}</pre></details>",
            escape_html(&pretty)
        ));
    }
    html.push_str("</div>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(id: u64, role: ChatRole, content: &str) -> Message {
        Message {
            id,
            role,
            content: content.to_string(),
            debug: None,
        }
    }

    #[test]
    fn same_id_renders_once() {
        let mut view = ConsoleView::new();
        let msg = message(5, ChatRole::Assistant, "hi");
        assert!(view.merge_message(&msg, false));
        assert!(!view.merge_message(&msg, false));
        assert_eq!(view.bubbles().len(), 1);
        assert!(view.contains("msg-5"));
        assert_eq!(view.bubbles()[0].html, "<div class=\"msg-content\"><p>hi</p></div>");
    }

    #[test]
    fn provisional_bubble_adopts_synced_id() {
        let mut view = ConsoleView::new();
        view.push_provisional(ChatRole::User, "uptime please", None);
        assert!(view.merge_message(&message(8, ChatRole::User, "uptime please"), false));
        assert_eq!(view.bubbles().len(), 1);
        assert_eq!(view.bubbles()[0].element_id.as_deref(), Some("msg-8"));

        // A second message with the same text is a new entry
        view.merge_message(&message(9, ChatRole::User, "uptime please"), false);
        assert_eq!(view.bubbles().len(), 2);
    }

    #[test]
    fn prefixed_reply_adopts_stored_id() {
        let mut view = ConsoleView::new();
        view.push_provisional(ChatRole::Assistant, "History is full.\n\nAll good", None);
        view.merge_message(&message(3, ChatRole::Assistant, "All good"), false);
        assert_eq!(view.bubbles().len(), 1);
        assert!(view.contains("msg-3"));
    }

    #[test]
    fn result_bubble_escapes_output() {
        let mut view = ConsoleView::new();
        view.push_result("ssh", "<ok>", Some(&[("Server", "web-1".to_string())]));
        let bubble = &view.bubbles()[0];
        assert_eq!(bubble.kind, BubbleKind::Result);
        assert!(bubble.html.contains("<pre><code>&lt;ok&gt;</code></pre>"));
        assert!(bubble.html.contains("<p>Server: web-1</p>"));
    }

    #[test]
    fn error_bubbles_are_never_adopted() {
        let mut view = ConsoleView::new();
        view.push_error("timeout");
        view.merge_message(&message(1, ChatRole::Assistant, "Error: timeout"), false);
        assert_eq!(view.bubbles().len(), 2);
        assert_eq!(view.bubbles()[0].kind, BubbleKind::Error);
    }

    #[test]
    fn user_text_is_not_markdown() {
        let mut view = ConsoleView::new();
        view.merge_message(&message(1, ChatRole::User, "**a** <i>"), false);
        assert_eq!(
            view.bubbles()[0].html,
            "<div class=\"msg-content\">**a** &lt;i&gt;</div>"
        );
    }

    #[test]
    fn debug_payload_only_when_enabled() {
        let mut view = ConsoleView::new();
        let mut msg = message(1, ChatRole::Assistant, "ok");
        msg.debug = Some(json!({"tokens": 12}));
        view.merge_message(&msg, false);
        assert!(!view.bubbles()[0].html.contains("debug-details"));

        msg.id = 2;
        view.merge_message(&msg, true);
        assert!(view.bubbles()[1].html.contains("&quot;tokens&quot;: 12"));
    }

    #[test]
    fn same_action_batch_keeps_card_state() {
        let json = r#"[{"id":1,"command":"ls"}]"#;
        let mut view = ConsoleView::new();
        view.replace_actions(ActionBlock::from_json(json));
        let generation = view.action_generation();
        view.card_mut(generation, 0).unwrap().begin();
        view.card_mut(generation, 0).unwrap().finish(true);

        view.replace_actions(ActionBlock::from_json(json));
        assert_eq!(view.action_generation(), generation);
        assert_eq!(view.action_block().unwrap().cards()[0].button_label(), "Done");

        view.replace_actions(ActionBlock::from_json(r#"[{"id":2,"command":"pwd"}]"#));
        assert!(view.card_mut(generation, 0).is_none());
    }

    #[test]
    fn clear_log_drops_everything() {
        let mut view = ConsoleView::new();
        view.merge_message(&message(1, ChatRole::Assistant, "a"), false);
        view.replace_actions(ActionBlock::from_json(r#"[{"id":1,"command":"ls"}]"#));
        view.clear_log();
        assert!(view.bubbles().is_empty());
        assert!(view.action_block().is_none());
        assert!(!view.contains("msg-1"));
    }

    #[test]
    fn notification_expires() {
        let mut view = ConsoleView::new();
        view.notify("saved", false);
        view.expire_notification(Instant::now());
        assert!(view.notification().is_some());
        view.expire_notification(Instant::now() + NOTIFICATION_TTL);
        assert!(view.notification().is_none());
    }
}

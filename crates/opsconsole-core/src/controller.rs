//! User-facing operations of the console.
//!
//! Each network-bound operation comes in two halves: a `begin_*` step that
//! validates and updates the view before the request goes out, and a
//! `complete_*` step that folds the response back in. Front ends that run
//! requests on background tasks call the halves themselves; the async
//! convenience methods chain them for everyone else.

use tracing::{debug, info, warn};

use crate::actions::{Action, ActionBlock};
use crate::api::{ActionOutcome, ConsoleApi, PromptDraft, SendResponse, StateBatch, UserSettings};
use crate::error::{ClientError, ClientResult};
use crate::session::ConversationSession;
use crate::state::ChatRole;
use crate::sync::{SyncEngine, SyncReport};
use crate::view::ConsoleView;

pub const SEND_FAILED_NOTICE: &str = "Message could not be sent, please try again.";
pub const ACTION_FAILED_NOTICE: &str = "Action could not be run, please try again.";
pub const PROMPT_UPDATED_NOTICE: &str = "Prompt updated.";
pub const LIMIT_REACHED_NOTICE: &str =
    "Conversation history is at its limit, the oldest messages will be dropped.";
const UNKNOWN_ERROR: &str = "unknown error";

/// What the caller should do once a completed operation has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    None,
    /// Pull the state now instead of waiting for the next poll.
    Sync,
}

/// An action execution in flight, tied to the batch it was started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTicket {
    generation: u64,
    index: usize,
    action: Action,
}

impl ExecTicket {
    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

pub struct ConversationController {
    api: ConsoleApi,
    sync: SyncEngine,
    session: ConversationSession,
    view: ConsoleView,
}

impl ConversationController {
    pub fn new(api: ConsoleApi) -> Self {
        Self {
            sync: SyncEngine::new(api.clone()),
            api,
            session: ConversationSession::new(),
            view: ConsoleView::new(),
        }
    }

    pub fn api(&self) -> &ConsoleApi {
        &self.api
    }

    pub fn sync_engine(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn view(&self) -> &ConsoleView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ConsoleView {
        &mut self.view
    }

    /// Load the user's settings, then pull the conversation so far.
    pub async fn init(&mut self) {
        let settings = self.api.user_settings().await;
        self.apply_settings(settings);
        self.sync_now().await;
    }

    pub fn apply_settings(&mut self, result: ClientResult<UserSettings>) {
        match result {
            Ok(settings) => {
                info!(login = ?settings.login, show_debug = settings.show_debug, "user settings loaded");
                self.session.set_show_debug(settings.show_debug);
                self.view.set_debug_checked(settings.show_debug);
            }
            Err(err) => warn!(error = %err, "could not load user settings"),
        }
    }

    pub async fn sync_now(&mut self) -> Option<SyncReport> {
        self.sync.poll_once(&mut self.session, &mut self.view).await
    }

    /// Apply a state fetch that ran elsewhere.
    pub fn apply_state(&mut self, result: ClientResult<StateBatch>) -> Option<SyncReport> {
        match result {
            Ok(batch) => Some(self.sync.apply(batch, &mut self.session, &mut self.view)),
            Err(err) => {
                self.sync.absorb_failure(&err);
                None
            }
        }
    }

    /// Validate the input and echo it into the log. Returns the text to post,
    /// or `None` when there is nothing to send or a send is already running.
    pub fn begin_send(&mut self) -> Option<String> {
        if self.session.is_sending() {
            return None;
        }
        let text = self.view.input.trim().to_string();
        if text.is_empty() {
            return None;
        }

        self.view.push_provisional(ChatRole::User, &text, None);
        self.view.input.clear();
        self.view.set_input_locked(true);
        self.view.set_typing(true);
        self.view.scroll_to_bottom();
        self.session.set_sending(true);
        Some(text)
    }

    pub fn complete_send(&mut self, result: ClientResult<SendResponse>) -> FollowUp {
        self.session.set_sending(false);
        self.view.set_input_locked(false);
        self.view.set_typing(false);

        let resp = match result {
            Ok(resp) => resp,
            Err(err) => {
                self.report_failure(&err, SEND_FAILED_NOTICE);
                return FollowUp::None;
            }
        };

        if resp.prompt_updated {
            let notice = resp.message.as_deref().unwrap_or(PROMPT_UPDATED_NOTICE);
            self.view.notify(notice, false);
            return FollowUp::None;
        }
        if let Some(error) = &resp.error {
            self.view.push_error(error);
            self.view.scroll_to_bottom();
            return FollowUp::None;
        }

        // A poll may have landed the stored reply while the request was out.
        if let Some(text) = resp.text.as_deref().filter(|t| !self.view.has_synced_reply(t)) {
            let debug = resp.debug.as_ref().filter(|_| self.session.show_debug());
            self.view.push_provisional(ChatRole::Assistant, text, debug);
        }
        if resp.has_actions {
            if let Some(json) = &resp.actions_json {
                self.view.replace_actions(ActionBlock::from_json(json));
            }
        }
        if resp.limit_reached {
            self.view.notify(LIMIT_REACHED_NOTICE, false);
        }
        self.view.scroll_to_bottom();
        FollowUp::Sync
    }

    pub async fn send(&mut self) -> FollowUp {
        let Some(text) = self.begin_send() else {
            return FollowUp::None;
        };
        let result = self.api.send(&text).await;
        let follow_up = self.complete_send(result);
        if follow_up == FollowUp::Sync {
            self.sync_now().await;
        }
        follow_up
    }

    /// Put the card at `index` of the live block into its executing state.
    pub fn begin_execute(&mut self, index: usize) -> Option<ExecTicket> {
        let generation = self.view.action_generation();
        let action = self.view.card_mut(generation, index)?.begin()?;
        debug!(id = %action.id, command = %action.command, "executing action");
        Some(ExecTicket {
            generation,
            index,
            action,
        })
    }

    pub fn complete_execute(
        &mut self,
        ticket: &ExecTicket,
        result: ClientResult<ActionOutcome>,
    ) -> FollowUp {
        let succeeded = matches!(&result, Ok(outcome) if outcome.is_success());
        // The batch may have been replaced while the request was out.
        if let Some(card) = self.view.card_mut(ticket.generation, ticket.index) {
            card.finish(succeeded);
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.report_failure(&err, ACTION_FAILED_NOTICE);
                return FollowUp::None;
            }
        };

        if !succeeded {
            self.view
                .push_error(outcome.error.as_deref().unwrap_or(UNKNOWN_ERROR));
            self.view.scroll_to_bottom();
            return FollowUp::None;
        }

        info!(id = %ticket.action.id, duration_ms = ?outcome.duration_ms, "action executed");
        let target = outcome.api.as_deref().unwrap_or(&ticket.action.target);
        let details = self.session.show_debug().then(|| {
            vec![
                ("Server", outcome.server.clone().unwrap_or_else(|| "-".to_string())),
                ("Command", outcome.command.clone().unwrap_or_else(|| "-".to_string())),
                ("Time", format!("{} ms", outcome.duration_ms.unwrap_or(0))),
            ]
        });
        self.view.push_result(
            target,
            outcome.output.as_deref().unwrap_or(""),
            details.as_deref(),
        );
        self.view.scroll_to_bottom();
        FollowUp::Sync
    }

    pub async fn execute_action(&mut self, index: usize) -> FollowUp {
        let Some(ticket) = self.begin_execute(index) else {
            return FollowUp::None;
        };
        let result = self.api.execute_action(&ticket.action.id).await;
        let follow_up = self.complete_execute(&ticket, result);
        if follow_up == FollowUp::Sync {
            self.sync_now().await;
        }
        follow_up
    }

    pub async fn new_conversation(&mut self) {
        let result = self.api.new_chat().await;
        self.complete_new_conversation(result);
    }

    pub fn complete_new_conversation(&mut self, result: ClientResult<()>) {
        match result {
            Ok(()) => {
                info!("conversation reset");
                self.view.clear_log();
                self.session.reset_cursor();
            }
            Err(err) => self.report_failure(&err, &format!("Error: {}", err)),
        }
    }

    pub async fn start_prompt_update(&mut self) {
        let result = self.api.start_prompt_update().await;
        self.complete_start_prompt(result);
    }

    pub fn complete_start_prompt(&mut self, result: ClientResult<PromptDraft>) {
        match result {
            Ok(draft) => {
                self.view.prompt_editor.text = draft.current_prompt.unwrap_or_default();
                self.view.prompt_editor.open = true;
            }
            Err(err) => self.report_failure(&err, &format!("Error: {}", err)),
        }
    }

    /// Text to submit from the open editor. Blank text is refused without a
    /// request and leaves the editor open.
    pub fn begin_submit_prompt(&self) -> Option<String> {
        if !self.view.prompt_editor.open {
            return None;
        }
        let text = self.view.prompt_editor.text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    pub fn complete_submit_prompt(&mut self, result: ClientResult<()>) {
        match result {
            Ok(()) => {
                self.close_prompt_editor();
                self.view.notify(PROMPT_UPDATED_NOTICE, false);
            }
            Err(err) => self.report_failure(&err, &format!("Error: {}", err)),
        }
    }

    pub async fn submit_prompt(&mut self) -> bool {
        let Some(text) = self.begin_submit_prompt() else {
            return false;
        };
        let result = self.api.submit_prompt(&text).await;
        let submitted = result.is_ok();
        self.complete_submit_prompt(result);
        submitted
    }

    pub fn close_prompt_editor(&mut self) {
        self.view.prompt_editor.open = false;
    }

    /// Flip the debug flag locally. Returns the new value, which the caller
    /// persists with [`ConsoleApi::set_debug`].
    pub fn apply_debug_toggle(&mut self) -> bool {
        let show = !self.session.show_debug();
        self.session.set_show_debug(show);
        self.view.set_debug_checked(show);
        show
    }

    pub fn complete_set_debug(&mut self, result: ClientResult<()>) {
        if let Err(err) = result {
            warn!(error = %err, "could not save debug setting");
        }
    }

    pub async fn toggle_debug(&mut self) -> bool {
        let show = self.apply_debug_toggle();
        let result = self.api.set_debug(show).await;
        self.complete_set_debug(result);
        show
    }

    /// Surface a foreground failure. A rejected session is already on its way
    /// to the login page, so it stays silent.
    fn report_failure(&mut self, err: &ClientError, notice: &str) {
        if err.is_unauthorized() {
            debug!("request rejected, login required");
            return;
        }
        warn!(error = %err, "request failed");
        match err.server_message() {
            Some(message) => {
                self.view.push_error(&message);
                self.view.scroll_to_bottom();
            }
            None => self.view.notify(notice, true),
        }
    }
}

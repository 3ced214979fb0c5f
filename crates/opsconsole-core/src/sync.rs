use tracing::{debug, warn};

use crate::actions::ActionBlock;
use crate::api::{ConsoleApi, StateBatch};
use crate::error::{ClientError, ClientResult};
use crate::session::ConversationSession;
use crate::view::ConsoleView;

/// What one applied batch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Messages newly added to (or bound in) the log.
    pub rendered: usize,
    /// Cursor after the batch.
    pub cursor: u64,
    pub actions_rendered: bool,
}

/// Incremental state sync against `/api/chat/state`.
///
/// Fetching and applying are separate steps: the fetch can run anywhere,
/// while [`apply`](Self::apply) must run wherever the session and view live.
#[derive(Clone)]
pub struct SyncEngine {
    api: ConsoleApi,
}

impl SyncEngine {
    pub fn new(api: ConsoleApi) -> Self {
        Self { api }
    }

    pub async fn fetch(&self, since: u64) -> ClientResult<StateBatch> {
        debug!(since, "polling chat state");
        self.api.chat_state(since).await
    }

    /// Merge `batch` into the view.
    ///
    /// The cursor is compared as it is now, not as it was when the request
    /// went out, so overlapping polls can land in any order.
    pub fn apply(
        &self,
        batch: StateBatch,
        session: &mut ConversationSession,
        view: &mut ConsoleView,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        for msg in &batch.messages {
            session.advance_cursor(msg.id);
            if view.merge_message(msg, session.show_debug()) {
                report.rendered += 1;
            }
        }

        if !batch.messages.is_empty() && batch.has_actions {
            if let Some(json) = batch.actions_json.as_deref() {
                let before = view.action_generation();
                view.replace_actions(ActionBlock::from_json(json));
                report.actions_rendered = view.action_generation() != before;
            }
        }

        if report.rendered > 0 || report.actions_rendered {
            view.scroll_to_bottom();
        }
        report.cursor = session.last_message_id();
        report
    }

    /// Background poll failures never reach the user.
    pub fn absorb_failure(&self, err: &ClientError) {
        if err.is_unauthorized() {
            debug!("state poll rejected, login required");
        } else {
            warn!(error = %err, "state poll failed");
        }
    }

    /// Fetch from the current cursor and apply in one go.
    pub async fn poll_once(
        &self,
        session: &mut ConversationSession,
        view: &mut ConsoleView,
    ) -> Option<SyncReport> {
        match self.fetch(session.last_message_id()).await {
            Ok(batch) => Some(self.apply(batch, session, view)),
            Err(err) => {
                self.absorb_failure(&err);
                None
            }
        }
    }
}

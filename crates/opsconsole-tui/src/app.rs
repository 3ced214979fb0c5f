use std::time::Instant;

use opsconsole_core::{ConversationController, HttpClient};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    Actions,
}

pub struct App {
    pub should_quit: bool,
    pub controller: ConversationController,
    pub focus: Focus,

    // Editing state (character positions, not bytes)
    pub input_cursor: usize,
    pub prompt_cursor: usize,

    // Action cards
    pub selected_action: usize,

    // New-chat confirmation popup
    pub confirm_new_chat: bool,

    // Log viewport
    pub log_scroll: u16,
    pub log_height: u16,
    pub follow_log: bool,
    last_scroll_generation: u64,

    // Animation state
    pub animation_frame: u8, // 0-2 for the typing indicator

    // Session redirect
    pub base_url: String,
    pub login_url: String,
    pub login_required: bool,
    location: watch::Receiver<Option<String>>,

    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        controller: ConversationController,
        client: &HttpClient,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            controller,
            focus: Focus::Input,
            input_cursor: 0,
            prompt_cursor: 0,
            selected_action: 0,
            confirm_new_chat: false,
            log_scroll: 0,
            log_height: 0,
            follow_log: true,
            last_scroll_generation: 0,
            animation_frame: 0,
            base_url: client.base_url().to_string(),
            login_url: client.login_url(),
            login_required: false,
            location: client.location(),
            events,
        }
    }

    pub fn events(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.events.clone()
    }

    pub fn tick(&mut self) {
        if self.controller.view().typing() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.controller.view_mut().expire_notification(Instant::now());
        self.check_location();
    }

    /// Pick up a redirect published by the HTTP client.
    pub fn check_location(&mut self) {
        if !self.location.has_changed().unwrap_or(false) {
            return;
        }
        let redirected = self.location.borrow_and_update().is_some();
        if redirected && !self.login_required {
            info!(url = %self.login_url, "login required");
            self.login_required = true;
        }
    }

    /// Re-pin the log to the bottom whenever the view asked for it.
    pub fn follow_view(&mut self) {
        let generation = self.controller.view().scroll_generation();
        if generation != self.last_scroll_generation {
            self.last_scroll_generation = generation;
            self.follow_log = true;
        }
    }

    pub fn action_count(&self) -> usize {
        self.controller
            .view()
            .action_block()
            .map(|block| block.cards().len())
            .unwrap_or(0)
    }

    pub fn select_next_action(&mut self) {
        let count = self.action_count();
        if count > 0 {
            self.selected_action = (self.selected_action + 1) % count;
        }
    }

    pub fn select_prev_action(&mut self) {
        let count = self.action_count();
        if count > 0 {
            self.selected_action = (self.selected_action + count - 1) % count;
        }
    }

    /// Keep the selection inside the current block after it changed.
    pub fn clamp_selection(&mut self) {
        let count = self.action_count();
        if self.selected_action >= count {
            self.selected_action = count.saturating_sub(1);
        }
        if count == 0 && self.focus == Focus::Actions {
            self.focus = Focus::Input;
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Input if self.action_count() > 0 => Focus::Actions,
            _ => Focus::Input,
        };
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_log = false;
        self.log_scroll = self.log_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.log_scroll = self.log_scroll.saturating_add(lines);
    }

    pub fn page(&self) -> u16 {
        self.log_height.max(2) / 2
    }

    /// Clamp the scroll offset against the rendered log height.
    pub fn fit_scroll(&mut self, total_lines: u16) {
        let max_scroll = total_lines.saturating_sub(self.log_height);
        if self.follow_log || self.log_scroll >= max_scroll {
            self.log_scroll = max_scroll;
            self.follow_log = true;
        }
    }
}

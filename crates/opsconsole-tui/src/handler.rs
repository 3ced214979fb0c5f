use std::future::Future;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use opsconsole_core::FollowUp;
use tracing::debug;

use crate::app::{App, Focus};
use crate::tui::{ApiEvent, AppEvent};

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Apply a line-editing key to `text`. Returns false for keys it does not
/// handle.
fn edit_text(text: &mut String, cursor: &mut usize, key: KeyEvent) -> bool {
    let char_count = text.chars().count();
    *cursor = (*cursor).min(char_count);
    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < char_count {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(char_count),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = char_count,
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

/// Run a console request off the UI task and post its result back.
fn spawn_api<F>(app: &App, request: F)
where
    F: Future<Output = ApiEvent> + Send + 'static,
{
    let tx = app.events();
    tokio::spawn(async move {
        let _ = tx.send(AppEvent::Api(request.await));
    });
}

pub fn spawn_settings(app: &App) {
    let api = app.controller.api().clone();
    spawn_api(app, async move { ApiEvent::Settings(api.user_settings().await) });
}

pub fn spawn_sync(app: &App) {
    let sync = app.controller.sync_engine().clone();
    let since = app.controller.session().last_message_id();
    spawn_api(app, async move { ApiEvent::State(sync.fetch(since).await) });
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
        AppEvent::Poll => spawn_sync(app),
        AppEvent::Api(api_event) => handle_api(app, api_event),
    }
    app.clamp_selection();
    app.follow_view();
    Ok(())
}

fn handle_api(app: &mut App, event: ApiEvent) {
    let follow_up = match event {
        ApiEvent::Settings(result) => {
            app.controller.apply_settings(result);
            FollowUp::Sync
        }
        ApiEvent::State(result) => {
            if let Some(report) = app.controller.apply_state(result) {
                if report.rendered > 0 {
                    debug!(rendered = report.rendered, cursor = report.cursor, "state applied");
                }
            }
            FollowUp::None
        }
        ApiEvent::Sent(result) => app.controller.complete_send(result),
        ApiEvent::Executed(ticket, result) => app.controller.complete_execute(&ticket, result),
        ApiEvent::ChatCleared(result) => {
            app.controller.complete_new_conversation(result);
            FollowUp::None
        }
        ApiEvent::PromptLoaded(result) => {
            app.controller.complete_start_prompt(result);
            app.prompt_cursor = app.controller.view().prompt_editor.text.chars().count();
            FollowUp::None
        }
        ApiEvent::PromptSubmitted(result) => {
            app.controller.complete_submit_prompt(result);
            FollowUp::None
        }
        ApiEvent::DebugSaved(result) => {
            app.controller.complete_set_debug(result);
            FollowUp::None
        }
    };
    app.check_location();

    if follow_up == FollowUp::Sync {
        spawn_sync(app);
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any mode
    if ctrl && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }

    if app.confirm_new_chat {
        handle_confirm_new_chat(app, key);
        return;
    }
    if app.controller.view().prompt_editor.open {
        handle_prompt_editor(app, key);
        return;
    }

    if ctrl {
        match key.code {
            KeyCode::Char('n') => app.confirm_new_chat = true,
            KeyCode::Char('p') => {
                let api = app.controller.api().clone();
                spawn_api(app, async move {
                    ApiEvent::PromptLoaded(api.start_prompt_update().await)
                });
            }
            KeyCode::Char('d') => {
                let show = app.controller.apply_debug_toggle();
                let api = app.controller.api().clone();
                spawn_api(app, async move { ApiEvent::DebugSaved(api.set_debug(show).await) });
            }
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Tab => {
            app.toggle_focus();
            return;
        }
        KeyCode::PageUp => {
            let page = app.page();
            app.scroll_up(page);
            return;
        }
        KeyCode::PageDown => {
            let page = app.page();
            app.scroll_down(page);
            return;
        }
        _ => {}
    }

    match app.focus {
        Focus::Input => handle_input(app, key),
        Focus::Actions => handle_actions(app, key),
    }
}

fn handle_confirm_new_chat(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            app.confirm_new_chat = false;
            let api = app.controller.api().clone();
            spawn_api(app, async move { ApiEvent::ChatCleared(api.new_chat().await) });
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.confirm_new_chat = false,
        _ => {}
    }
}

fn handle_prompt_editor(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.controller.close_prompt_editor(),
        KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if let Some(text) = app.controller.begin_submit_prompt() {
                let api = app.controller.api().clone();
                spawn_api(app, async move {
                    ApiEvent::PromptSubmitted(api.submit_prompt(&text).await)
                });
            }
        }
        KeyCode::Enter => {
            let cursor = &mut app.prompt_cursor;
            let text = &mut app.controller.view_mut().prompt_editor.text;
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, '\n');
            *cursor += 1;
        }
        _ => {
            let cursor = &mut app.prompt_cursor;
            edit_text(&mut app.controller.view_mut().prompt_editor.text, cursor, key);
        }
    }
}

fn handle_input(app: &mut App, key: KeyEvent) {
    if app.controller.view().input_locked() {
        return;
    }
    match key.code {
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
            let cursor = &mut app.input_cursor;
            let input = &mut app.controller.view_mut().input;
            let byte_pos = char_to_byte_index(input, *cursor);
            input.insert(byte_pos, '\n');
            *cursor += 1;
        }
        KeyCode::Enter => {
            if let Some(text) = app.controller.begin_send() {
                app.input_cursor = 0;
                let api = app.controller.api().clone();
                spawn_api(app, async move { ApiEvent::Sent(api.send(&text).await) });
            }
        }
        _ => {
            let cursor = &mut app.input_cursor;
            edit_text(&mut app.controller.view_mut().input, cursor, key);
        }
    }
}

fn handle_actions(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Esc => app.focus = Focus::Input,
        KeyCode::Char('j') | KeyCode::Down => app.select_next_action(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev_action(),
        KeyCode::Enter | KeyCode::Char('x') => {
            if let Some(ticket) = app.controller.begin_execute(app.selected_action) {
                let api = app.controller.api().clone();
                spawn_api(app, async move {
                    let result = api.execute_action(&ticket.action().id).await;
                    ApiEvent::Executed(ticket, result)
                });
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_app;
    use crossterm::event::{KeyEventKind, KeyEventState};
    use opsconsole_core::{ActionBlock, ClientError, ExecState};
    use pretty_assertions::assert_eq;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn edits_respect_multibyte_characters() {
        let mut text = String::from("héllo");
        let mut cursor = 2;
        edit_text(&mut text, &mut cursor, key(KeyCode::Backspace));
        assert_eq!(text, "hllo");
        edit_text(&mut text, &mut cursor, key(KeyCode::Char('ü')));
        assert_eq!(text, "hüllo");
        assert_eq!(cursor, 2);
        assert!(!edit_text(&mut text, &mut cursor, key(KeyCode::Tab)));
    }

    #[test]
    fn blank_enter_sends_nothing() {
        let (mut app, mut rx) = test_app();
        app.controller.view_mut().input = "   ".to_string();
        handle_key(&mut app, key(KeyCode::Enter));
        assert!(!app.controller.session().is_sending());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn alt_enter_inserts_newline() {
        let (mut app, _rx) = test_app();
        for c in "ab".chars() {
            handle_key(&mut app, key(KeyCode::Char(c)));
        }
        handle_key(&mut app, KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT));
        handle_key(&mut app, key(KeyCode::Char('c')));
        assert_eq!(app.controller.view().input, "ab\nc");
    }

    #[test]
    fn new_chat_needs_confirmation() {
        let (mut app, _rx) = test_app();
        handle_key(&mut app, ctrl('n'));
        assert!(app.confirm_new_chat);
        handle_key(&mut app, key(KeyCode::Esc));
        assert!(!app.confirm_new_chat);
    }

    #[test]
    fn prompt_editor_captures_keys() {
        let (mut app, _rx) = test_app();
        app.controller.view_mut().prompt_editor.open = true;
        handle_key(&mut app, key(KeyCode::Char('q')));
        handle_key(&mut app, key(KeyCode::Enter));
        assert_eq!(app.controller.view().prompt_editor.text, "q\n");
        assert!(!app.should_quit);

        handle_key(&mut app, key(KeyCode::Esc));
        assert!(!app.controller.view().prompt_editor.open);
    }

    #[test]
    fn failed_execution_event_restores_card() {
        let (mut app, _rx) = test_app();
        app.controller
            .view_mut()
            .replace_actions(ActionBlock::from_json("[{\"id\":1,\"command\":\"ls\"}]"));
        let ticket = app.controller.begin_execute(0).unwrap();
        assert_eq!(
            app.controller.view().action_block().unwrap().cards()[0].state(),
            ExecState::Executing
        );

        handle_event(
            &mut app,
            AppEvent::Api(ApiEvent::Executed(
                ticket,
                Err(ClientError::Transport("refused".into())),
            )),
        )
        .unwrap();
        let card = &app.controller.view().action_block().unwrap().cards()[0];
        assert_eq!(card.button_label(), "Execute 1");
        assert!(app.controller.view().notification().unwrap().is_error);
    }
}

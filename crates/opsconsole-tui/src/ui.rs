use opsconsole_core::{ActionBlock, Bubble, BubbleKind, ChatRole, ExecState, Risk};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, Focus};

const ENTITIES: [(&str, &str); 5] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    // Last, so escaped entities come out literally
    ("&amp;", "&"),
];

fn unescape(text: &str) -> String {
    ENTITIES
        .iter()
        .fold(text.to_string(), |out, (entity, ch)| out.replace(entity, ch))
}

#[derive(Default)]
struct LineBuilder {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    bold: usize,
    code: usize,
    pre: bool,
}

impl LineBuilder {
    fn text(&mut self, raw: &str) {
        let text = unescape(raw);
        if !self.pre {
            // Outside <pre> newlines are only markup formatting
            self.span(&text.replace('\n', ""));
            return;
        }
        let mut parts = text.split('\n');
        if let Some(first) = parts.next() {
            self.span(first);
        }
        for part in parts {
            self.break_line();
            self.span(part);
        }
    }

    fn span(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut style = Style::default();
        if self.pre || self.code > 0 {
            style = style.fg(Color::Green);
        }
        if self.bold > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        self.spans.push(Span::styled(text.to_string(), style));
    }

    fn break_line(&mut self) {
        self.lines.push(Line::from(std::mem::take(&mut self.spans)));
    }

    fn end_block(&mut self) {
        if !self.spans.is_empty() {
            self.break_line();
        }
    }

    fn tag(&mut self, tag: &str) {
        let closing = tag.starts_with('/');
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace())
            .next()
            .unwrap_or("");

        match (name, closing) {
            ("br", _) => self.break_line(),
            ("p", true) => {
                self.end_block();
                self.lines.push(Line::default());
            }
            ("p" | "div" | "details", _) => self.end_block(),
            ("pre", _) => {
                self.end_block();
                self.pre = !closing;
            }
            ("strong", false) => self.bold += 1,
            ("strong", true) => self.bold = self.bold.saturating_sub(1),
            ("code", false) => self.code += 1,
            ("code", true) => self.code = self.code.saturating_sub(1),
            ("summary", false) => {
                self.end_block();
                self.spans
                    .push(Span::styled("▸ ", Style::default().fg(Color::DarkGray)));
            }
            ("summary", true) => self.end_block(),
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.end_block();
        while self.lines.last().is_some_and(|line| line.width() == 0) {
            self.lines.pop();
        }
        self.lines
    }
}

/// Turn the console's message markup into styled terminal lines.
pub fn html_to_lines(html: &str) -> Vec<Line<'static>> {
    let mut out = LineBuilder::default();
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        out.text(&rest[..start]);
        out.tag(&rest[start + 1..start + len]);
        rest = &rest[start + len + 1..];
    }
    out.text(rest);
    out.finish()
}

/// Rows `lines` take up when wrapped at `width` columns.
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    let rows: usize = lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum();
    rows.min(u16::MAX as usize) as u16
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    let input_lines = app.controller.view().input.split('\n').count() as u16;
    let input_height = input_lines.clamp(1, 4) + 2;
    let actions_height = actions_panel_height(app, body_area.height);

    let [log_area, actions_area, input_area] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(actions_height),
        Constraint::Length(input_height),
    ])
    .areas(body_area);

    render_header(app, frame, header_area);
    render_log(app, frame, log_area);
    if actions_height > 0 {
        render_actions(app, frame, actions_area);
    }
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Popups
    if app.confirm_new_chat {
        render_confirm_new_chat(frame, area);
    } else if app.controller.view().prompt_editor.open {
        render_prompt_editor(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled(" Ops Console ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.base_url.clone(), Style::default().fg(Color::Gray)),
    ];
    if app.controller.session().show_debug() {
        spans.push(Span::styled(" [debug]", Style::default().fg(Color::Yellow)));
    }
    if app.login_required {
        spans.push(Span::styled(
            format!(" Session expired, sign in at {} ", app.login_url),
            Style::default().bg(Color::Red).fg(Color::White).bold(),
        ));
    }
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::Gray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn bubble_label(bubble: &Bubble) -> Span<'static> {
    let (label, color) = match (bubble.kind, bubble.role) {
        (BubbleKind::Error, _) => ("Agent (error):", Color::Red),
        (BubbleKind::Result, _) => ("Result:", Color::Magenta),
        (_, ChatRole::User) => ("You:", Color::Cyan),
        (_, ChatRole::Assistant) => ("Agent:", Color::Yellow),
        (_, ChatRole::System) => ("System:", Color::Gray),
    };
    Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD))
}

fn render_log(app: &mut App, frame: &mut Frame, area: Rect) {
    let view = app.controller.view();
    let mut lines: Vec<Line> = Vec::new();

    for bubble in view.bubbles() {
        let mut label = vec![bubble_label(bubble)];
        if bubble.is_provisional() {
            label.push(Span::styled(" …", Style::default().fg(Color::DarkGray)));
        }
        lines.push(Line::from(label));
        let body = html_to_lines(&bubble.html);
        if bubble.kind == BubbleKind::Error {
            lines.extend(body.into_iter().map(|line| line.fg(Color::Red)));
        } else {
            lines.extend(body);
        }
        lines.push(Line::default());
    }

    if view.typing() {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Agent is typing{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let text = if lines.is_empty() {
        Text::from(Span::styled(
            "Ask the agent about your servers...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(lines)
    };

    // Inner size minus borders
    app.log_height = area.height.saturating_sub(2);
    let total = wrapped_height(&text.lines, area.width.saturating_sub(2));
    app.fit_scroll(total);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");
    let log = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.log_scroll, 0));
    frame.render_widget(log, area);
}

fn risk_style(risk: Risk) -> Style {
    let color = match risk {
        Risk::Low => Color::Green,
        Risk::Medium => Color::Yellow,
        Risk::High => Color::Red,
    };
    Style::default().bg(color).fg(Color::Black).add_modifier(Modifier::BOLD)
}

fn card_lines(block: &ActionBlock) -> Vec<Vec<Line<'static>>> {
    block
        .cards()
        .iter()
        .map(|card| {
            let action = card.action();
            let mut target = action.target.clone();
            if let Some(server) = &action.server {
                if !target.is_empty() {
                    target.push_str(" · ");
                }
                target.push_str(server);
            }

            let mut head = vec![
                Span::styled(format!(" {} ", action.risk.as_str()), risk_style(action.risk)),
                Span::raw(" "),
            ];
            if !target.is_empty() {
                head.push(Span::styled(format!("{}  ", target), Style::default().fg(Color::Gray)));
            }
            if let Some(title) = &action.title {
                head.push(Span::styled(title.clone(), Style::default().bold()));
            }

            let mut lines = vec![Line::from(head)];
            if !action.description.is_empty() {
                lines.push(Line::from(format!("  {}", action.description)));
            }
            if !action.command.is_empty() {
                lines.push(Line::from(vec![
                    Span::raw("  $ "),
                    Span::styled(action.command.clone(), Style::default().fg(Color::Green)),
                ]));
            }
            if !card.read_only() {
                lines.push(Line::from(Span::styled(
                    "  ⚠ Not a read-only command, it may change the system.",
                    Style::default().fg(Color::Yellow),
                )));
            }
            let button_style = match card.state() {
                ExecState::Idle => Style::default().fg(Color::Cyan).bold(),
                ExecState::Executing => Style::default().fg(Color::DarkGray),
                ExecState::Done => Style::default().fg(Color::Green),
            };
            lines.push(Line::from(Span::styled(
                format!("  [ {} ]", card.button_label()),
                button_style,
            )));
            lines
        })
        .collect()
}

fn actions_panel_height(app: &App, available: u16) -> u16 {
    let Some(block) = app.controller.view().action_block() else {
        return 0;
    };
    let mut rows: usize = card_lines(block).iter().map(Vec::len).sum();
    if app.controller.session().show_debug() {
        rows += 1;
    }
    let wanted = (rows + 2).min(u16::MAX as usize) as u16;
    wanted.min(available / 5 * 2)
}

fn render_actions(app: &App, frame: &mut Frame, area: Rect) {
    let Some(block) = app.controller.view().action_block() else {
        return;
    };
    let focused = app.focus == Focus::Actions;

    let mut items: Vec<ListItem> = card_lines(block).into_iter().map(ListItem::new).collect();
    if app.controller.session().show_debug() {
        items.push(ListItem::new(Line::from(Span::styled(
            format!("Actions JSON: {}", block.raw_json()),
            Style::default().fg(Color::DarkGray),
        ))));
    }

    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color))
                .title(" Proposed actions (Tab to focus, Enter to run) "),
        )
        .highlight_style(Style::default().bg(Color::Black).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if focused {
        state.select(Some(app.selected_action));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

/// Column and row of a character cursor in multi-line text.
fn cursor_position(text: &str, cursor: usize) -> (u16, u16) {
    let before: String = text.chars().take(cursor).collect();
    let row = before.matches('\n').count();
    let col = before.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0);
    (col as u16, row as u16)
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let view = app.controller.view();
    let locked = view.input_locked();
    let focused = app.focus == Focus::Input && !locked;

    let (title, border_color) = if locked {
        (" Sending... ", Color::DarkGray)
    } else if focused {
        (" Message (Enter send, Alt-Enter newline) ", Color::Yellow)
    } else {
        (" Message (Tab to focus) ", Color::DarkGray)
    };

    let (col, row) = cursor_position(&view.input, app.input_cursor);
    let inner_height = area.height.saturating_sub(2);
    let scroll_y = row.saturating_sub(inner_height.saturating_sub(1));

    let input = Paragraph::new(view.input.as_str())
        .style(Style::default().fg(if locked { Color::DarkGray } else { Color::Cyan }))
        .scroll((scroll_y, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color))
                .title(title),
        );
    frame.render_widget(input, area);

    if focused {
        let x = (area.x + 1 + col).min(area.right().saturating_sub(2));
        frame.set_cursor_position((x, area.y + 1 + row - scroll_y));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    if let Some(notification) = app.controller.view().notification() {
        let style = if notification.is_error {
            Style::default().bg(Color::Red).fg(Color::White)
        } else {
            Style::default().bg(Color::Green).fg(Color::Black)
        };
        let footer = Paragraph::new(format!(" {} ", notification.text)).style(style);
        frame.render_widget(footer, area);
        return;
    }

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = match app.focus {
        Focus::Input => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
        ],
        Focus::Actions => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" select ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" execute ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
    };
    hints.extend(vec![
        Span::styled(" Tab ", key_style),
        Span::styled(" focus ", label_style),
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" ^N ", key_style),
        Span::styled(" new chat ", label_style),
        Span::styled(" ^P ", key_style),
        Span::styled(" prompt ", label_style),
        Span::styled(" ^D ", key_style),
        Span::styled(
            if app.controller.session().show_debug() { " debug off " } else { " debug on " },
            label_style,
        ),
        Span::styled(" ^C ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_confirm_new_chat(frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 52, 5);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" New conversation ");
    let text = Text::from(vec![
        Line::from("Start a new conversation? History will be deleted."),
        Line::from(Span::styled("y: confirm   n/Esc: cancel", Style::default().fg(Color::Gray))),
    ]);
    frame.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: true }),
        popup_area,
    );
}

fn render_prompt_editor(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, area.width / 5 * 4, area.height / 5 * 3);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" System prompt (Ctrl-S save, Esc close) ");
    let inner = block.inner(popup_area);

    let editor = &app.controller.view().prompt_editor;
    let (col, row) = cursor_position(&editor.text, app.prompt_cursor);
    let scroll_y = row.saturating_sub(inner.height.saturating_sub(1));

    frame.render_widget(
        Paragraph::new(editor.text.as_str())
            .block(block)
            .scroll((scroll_y, 0)),
        popup_area,
    );
    if inner.width > 0 && inner.height > 0 {
        let x = (inner.x + col).min(inner.right().saturating_sub(1));
        frame.set_cursor_position((x, inner.y + row - scroll_y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn plain(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn message_markup_becomes_lines() {
        let lines = html_to_lines(
            "<div class=\"msg-content\"><p>Run <code>df -h</code> &amp; <strong>check</strong></p>\n<pre><code>a\nb</code></pre>\n</div>",
        );
        assert_eq!(plain(&lines), vec!["Run df -h & check", "", "a", "b"]);

        let bold = lines[0].spans.iter().find(|s| s.content == "check").unwrap();
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
        let code = lines[0].spans.iter().find(|s| s.content == "df -h").unwrap();
        assert_eq!(code.style.fg, Some(Color::Green));
    }

    #[test]
    fn plain_text_breaks_and_entities() {
        let lines = html_to_lines("<div class=\"msg-content\">a &lt;b&gt;<br>&amp;lt; &#39;q&#39;</div>");
        assert_eq!(plain(&lines), vec!["a <b>", "&lt; 'q'"]);
    }

    #[test]
    fn blank_lines_inside_code_survive() {
        let lines = html_to_lines("<pre><code>x\n\ny</code></pre>");
        assert_eq!(plain(&lines), vec!["x", "", "y"]);
    }

    #[test]
    fn details_summary_gets_marker() {
        let lines = html_to_lines(
            "<div><details class=\"debug-details\"><summary>Details</summary><p>Server: web-1</p></details></div>",
        );
        assert_eq!(plain(&lines), vec!["▸ Details", "Server: web-1"]);
    }

    #[test]
    fn unterminated_tag_is_text() {
        assert_eq!(plain(&html_to_lines("a < b")), vec!["a < b"]);
    }

    #[test]
    fn wrapped_height_counts_rows() {
        let lines = vec![Line::from("abcdefghij"), Line::default(), Line::from("abc")];
        assert_eq!(wrapped_height(&lines, 4), 3 + 1 + 1);
    }

    #[test]
    fn cursor_in_multiline_text() {
        assert_eq!(cursor_position("ab\ncde", 5), (2, 1));
        assert_eq!(cursor_position("ab\n", 3), (0, 1));
        assert_eq!(cursor_position("", 0), (0, 0));
    }
}

//! Proposed actions: parsing, normalization and card rendering.
//!
//! The server hands actions over as a JSON string. Two key-naming conventions
//! are in circulation (`command`/`cmd`, `risk_level`/`riskLevel`,
//! `description`/`desc`, optional `params` nesting); [`parse_actions`] folds
//! them into one canonical [`Action`] straight away so nothing downstream has
//! to care.

use serde_json::{Map, Value};
use tracing::debug;

use crate::classifier::is_read_only;
use crate::markdown::escape_html;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Risk {
    Low,
    #[default]
    Medium,
    High,
}

impl Risk {
    /// Unknown or missing values fall back to medium.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Risk::Low,
            "high" => Risk::High,
            _ => Risk::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: String,
    pub title: Option<String>,
    pub command: String,
    /// Which API executes the action (`ssh`, `list_servers`, ...).
    pub target: String,
    pub server: Option<String>,
    pub description: String,
    pub risk: Risk,
}

impl Action {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let params = obj.get("params").and_then(Value::as_object);

        let id = match obj.get("id")? {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let command = first_str(obj, &["command", "cmd"])
            .or_else(|| params.and_then(|p| first_str(p, &["command", "cmd"])))
            .unwrap_or_default();
        let server = first_str(obj, &["server"])
            .or_else(|| params.and_then(|p| first_str(p, &["server"])));
        let risk = first_str(obj, &["risk", "risk_level", "riskLevel"])
            .map(|r| Risk::parse(&r))
            .unwrap_or_default();

        Some(Self {
            id,
            title: first_str(obj, &["title"]),
            command,
            target: first_str(obj, &["api", "target"]).unwrap_or_default(),
            server,
            description: first_str(obj, &["description", "desc"]).unwrap_or_default(),
            risk,
        })
    }

    pub fn is_read_only(&self) -> bool {
        is_read_only(&self.command)
    }
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Parse an action payload. Anything unparsable yields an empty list.
pub fn parse_actions(json: &str) -> Vec<Action> {
    let value: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "action payload is not valid JSON");
            return Vec::new();
        }
    };

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("actions") {
            Some(Value::Array(items)) => items,
            _ => {
                debug!("action payload has no actions array");
                return Vec::new();
            }
        },
        _ => {
            debug!("action payload is neither an object nor an array");
            return Vec::new();
        }
    };

    items.iter().filter_map(Action::from_value).collect()
}

/// Lifecycle of a card's execute control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecState {
    #[default]
    Idle,
    Executing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCard {
    action: Action,
    read_only: bool,
    state: ExecState,
}

impl ActionCard {
    pub fn new(action: Action) -> Self {
        let read_only = action.is_read_only();
        Self {
            action,
            read_only,
            state: ExecState::Idle,
        }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state == ExecState::Idle
    }

    pub fn button_label(&self) -> String {
        match self.state {
            ExecState::Idle => format!("Execute {}", self.action.id),
            ExecState::Executing => "Executing...".to_string(),
            ExecState::Done => "Done".to_string(),
        }
    }

    /// Disable the control and hand back the action to execute. `None` when
    /// the card is busy or already done.
    pub fn begin(&mut self) -> Option<Action> {
        if self.state != ExecState::Idle {
            return None;
        }
        self.state = ExecState::Executing;
        Some(self.action.clone())
    }

    /// Success is terminal; failure re-enables the control for a manual retry.
    pub fn finish(&mut self, succeeded: bool) {
        self.state = if succeeded {
            ExecState::Done
        } else {
            ExecState::Idle
        };
    }

    pub fn to_html(&self) -> String {
        let action = &self.action;
        let risk = action.risk.as_str();
        let mut html = format!("<div class=\"action-card risk-{}\">", risk);

        let mut target = escape_html(&action.target);
        if let Some(server) = &action.server {
            if !target.is_empty() {
                target.push_str(" · ");
            }
            target.push_str(&escape_html(server));
        }
        html.push_str(&format!("<div class=\"action-target\">{}</div>", target));
        html.push_str(&format!(
            "<span class=\"risk-badge risk-{}\">{}</span>",
            risk, risk
        ));
        if let Some(title) = &action.title {
            html.push_str(&format!(
                "<div class=\"action-title\">{}</div>",
                escape_html(title)
            ));
        }
        html.push_str(&format!(
            "<div class=\"action-desc\">{}</div>",
            escape_html(&action.description)
        ));
        if !action.command.is_empty() {
            html.push_str(&format!(
                "<div class=\"action-command\"><code>{}</code></div>",
                escape_html(&action.command)
            ));
        }
        if !self.read_only {
            html.push_str(
                "<div class=\"warning-text\">This is not a read-only command and may change the system.</div>",
            );
        }
        html.push_str(&format!(
            "<button class=\"action-btn\" data-action-id=\"{}\"{}>{}</button>",
            escape_html(&action.id),
            if self.is_enabled() { "" } else { " disabled" },
            escape_html(&self.button_label())
        ));
        html.push_str("</div>");
        html
    }
}

/// The single live block of action cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBlock {
    cards: Vec<ActionCard>,
    raw_json: String,
}

impl ActionBlock {
    /// `None` when the payload holds no usable actions.
    pub fn from_json(json: &str) -> Option<Self> {
        let actions = parse_actions(json);
        if actions.is_empty() {
            return None;
        }
        Some(Self {
            cards: actions.into_iter().map(ActionCard::new).collect(),
            raw_json: json.to_string(),
        })
    }

    pub fn cards(&self) -> &[ActionCard] {
        &self.cards
    }

    pub fn card_mut(&mut self, index: usize) -> Option<&mut ActionCard> {
        self.cards.get_mut(index)
    }

    pub fn raw_json(&self) -> &str {
        &self.raw_json
    }

    pub fn to_html(&self, show_debug: bool) -> String {
        let mut html = String::from(
            "<div id=\"actionsContainer\" class=\"actions-container\"><div class=\"actions-header\">Proposed actions:</div>",
        );
        for card in &self.cards {
            html.push_str(&card.to_html());
        }
        if show_debug {
            html.push_str(&format!(
                "<details class=\"debug-details\"><summary>Actions JSON</summary><pre>{}</pre></details>",
                escape_html(&self.raw_json)
            ));
        }
        html.push_str("</div>");
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn object_payload_with_primary_keys() {
        let actions = parse_actions(
            r#"{"actions":[{"id":1,"command":"ls","api":"ssh","description":"list","risk":"low"}]}"#,
        );
        assert_eq!(
            actions,
            vec![Action {
                id: "1".to_string(),
                title: None,
                command: "ls".to_string(),
                target: "ssh".to_string(),
                server: None,
                description: "list".to_string(),
                risk: Risk::Low,
            }]
        );
    }

    #[test]
    fn bare_array_with_alternate_keys() {
        let actions = parse_actions(
            r#"[{"id":"a7","cmd":"systemctl restart nginx","target":"ssh","desc":"restart","riskLevel":"HIGH"},
                {"id":"a8","cmd":"df -h","risk_level":"low"}]"#,
        );
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].command, "systemctl restart nginx");
        assert_eq!(actions[0].target, "ssh");
        assert_eq!(actions[0].description, "restart");
        assert_eq!(actions[0].risk, Risk::High);
        assert_eq!(actions[1].risk, Risk::Low);
    }

    #[test]
    fn params_nesting_is_flattened() {
        let actions = parse_actions(
            r#"{"actions":[{"id":2,"title":"Check disk","api":"ssh","params":{"server":"web-1","command":"df -h"}}]}"#,
        );
        assert_eq!(actions[0].command, "df -h");
        assert_eq!(actions[0].server.as_deref(), Some("web-1"));
        assert_eq!(actions[0].title.as_deref(), Some("Check disk"));
    }

    #[test]
    fn risk_defaults_to_medium() {
        let actions = parse_actions(r#"[{"id":1,"command":"ls"},{"id":2,"command":"ls","risk":"extreme"}]"#);
        assert_eq!(actions[0].risk, Risk::Medium);
        assert_eq!(actions[1].risk, Risk::Medium);
    }

    #[test]
    fn malformed_payloads_yield_nothing() {
        assert!(parse_actions("not json").is_empty());
        assert!(parse_actions(r#"{"foo":[]}"#).is_empty());
        assert!(parse_actions(r#"{"actions":"ls"}"#).is_empty());
        assert!(parse_actions("42").is_empty());
        assert!(ActionBlock::from_json(r#"{"actions":[]}"#).is_none());
        assert!(ActionBlock::from_json("{").is_none());
    }

    #[test]
    fn elements_without_id_are_skipped() {
        let actions = parse_actions(r#"[{"command":"ls"},"junk",{"id":5,"command":"pwd"}]"#);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, "5");
    }

    #[test]
    fn read_only_card_has_no_warning() {
        let block = ActionBlock::from_json(r#"{"actions":[{"id":1,"command":"ls","risk":"low"}]}"#)
            .unwrap();
        let card = &block.cards()[0];
        assert!(card.read_only());
        assert_eq!(card.button_label(), "Execute 1");
        let html = card.to_html();
        assert!(!html.contains("warning-text"));
        assert!(html.contains(">Execute 1</button>"));
    }

    #[test]
    fn mutating_card_warns_and_escapes_command() {
        let block = ActionBlock::from_json(
            r#"[{"id":3,"command":"echo '<b>' > /etc/motd","risk":"high"}]"#,
        )
        .unwrap();
        let html = block.cards()[0].to_html();
        assert!(html.contains("warning-text"));
        assert!(html.contains("echo &#39;&lt;b&gt;&#39; &gt; /etc/motd"));
        assert!(html.contains("risk-high"));
    }

    #[test]
    fn execute_control_lifecycle() {
        let mut card = ActionCard::new(parse_actions(r#"[{"id":9,"command":"uptime"}]"#).remove(0));
        let action = card.begin().unwrap();
        assert_eq!(action.id, "9");
        assert_eq!(card.button_label(), "Executing...");
        assert!(card.begin().is_none());
        assert!(card.to_html().contains(" disabled>"));

        card.finish(false);
        assert!(card.is_enabled());
        assert_eq!(card.button_label(), "Execute 9");

        card.begin();
        card.finish(true);
        assert_eq!(card.state(), ExecState::Done);
        assert!(card.begin().is_none());
    }

    #[test]
    fn debug_section_only_in_debug_mode() {
        let block = ActionBlock::from_json(r#"[{"id":1,"command":"ls"}]"#).unwrap();
        assert!(!block.to_html(false).contains("debug-details"));
        assert!(block.to_html(true).contains("Actions JSON"));
    }
}

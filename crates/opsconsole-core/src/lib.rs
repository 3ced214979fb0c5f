pub mod actions;
pub mod api;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod markdown;
pub mod session;
pub mod state;
pub mod sync;
pub mod view;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use actions::{Action, ActionBlock, ActionCard, ExecState, Risk};
pub use api::{ActionOutcome, ConsoleApi, PromptDraft, SendResponse, StateBatch, UserSettings};
pub use classifier::is_read_only;
pub use config::ConsoleConfig;
pub use controller::{ConversationController, ExecTicket, FollowUp};
pub use error::{ClientError, ClientResult};
pub use http::{HttpClient, Transport};
pub use session::ConversationSession;
pub use state::{ChatRole, Message};
pub use sync::{SyncEngine, SyncReport};
pub use view::{Bubble, BubbleKind, ConsoleView, Notification};

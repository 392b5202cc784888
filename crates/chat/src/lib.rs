//! Chat Integration - Mattermost bot interface
//!
//! This crate provides the chat side of Rent-a-Carlos:
//! - **Model** (`model`) - posts, attachments, buttons, dialogs and replies
//! - **Platform** (`platform`) - the `ChatPlatform` adapter trait
//! - **Mattermost** (`mattermost`) - REST API v4 adapter
//! - **Memory** (`memory`) - in-process adapter used by tests and local runs
//! - **Workflow** (`workflow`) - creates help requests
//! - **Dialog** (`dialog`) - the request form and its submissions
//! - **Commands** (`commands`) - `/rent-a-carlos`, `help`, `request`
//! - **Tasks** (`tasks`) - `complete` and `reject` button callbacks
//!
//! # Architecture
//!
//! ```text
//! Slash command → CommandDispatcher ─┬→ RequestWorkflow → ChatPlatform
//!                                    └→ InteractiveDialogLauncher ┘
//! Button click  → TaskStateHandler → RequestLedger + ChatPlatform
//! ```

pub mod commands;
pub mod dialog;
pub mod mattermost;
pub mod memory;
pub mod model;
pub mod platform;
pub mod tasks;
pub mod workflow;

pub use commands::{CommandDispatcher, SlashCommand};
pub use dialog::InteractiveDialogLauncher;
pub use mattermost::MattermostClient;
pub use memory::InMemoryChatPlatform;
pub use platform::{BotIdentity, ChatPlatform, PlatformError};
pub use tasks::TaskStateHandler;
pub use workflow::{CallbackUrls, RequestWorkflow};

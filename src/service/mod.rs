//! # Service Layer
//!
//! Server-side state and behavior of the lobby protocol.
//!
//! ## Components
//! - **Context**: registries, runtime settings, and metrics shared by all tasks
//! - **Session**: the per-connection state machine
//! - **Lobby**: 4-slot membership and key/value state
//! - **Relay**: streaming of announced payloads between control connections
//! - **Admin**: the console reached through `AdminLogin`
//! - **Sweeper**: periodic removal of idle lobbies

pub mod admin;
pub mod context;
pub mod filter;
pub mod lobby;
pub mod locale;
pub mod peer;
pub mod registry;
pub mod relay;
pub mod session;
pub mod sweeper;

pub use admin::{AdminConnection, AdminConsole, TextAdminConsole};
pub use context::ServerContext;
pub use filter::{PassThrough, RegexFilter, TextFilter};
pub use lobby::Lobby;
pub use peer::Peer;
pub use session::{Control, Session};

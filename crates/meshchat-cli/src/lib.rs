//! Meshchat console demo.
//!
//! Runs several chat "tabs" in one process, connected through the in-memory
//! rendezvous from `meshchat-harness` but driven by the wall clock and OS
//! randomness. Each tab is a full [`meshchat_core::Session`]: creating,
//! joining, chatting, file transfer and teardown behave exactly as they would
//! between browser tabs.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod console;
pub mod names;
pub mod render;
pub mod runtime;
pub mod system_env;

pub use console::{CONSOLE_HELP, ConsoleCommand, ConsoleError, parse_console};
pub use runtime::{Runtime, RuntimeError};
pub use system_env::SystemEnv;

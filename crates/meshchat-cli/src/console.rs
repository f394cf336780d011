//! Console line grammar.
//!
//! Lines starting with `:` drive the demo itself: tabs, channel creation and
//! joining, file attachments. Any other line is typed into the active tab, so
//! chat text and `/commands` reach the session unchanged.

use std::path::{Path, PathBuf};

use meshchat_proto::{ChannelId, ProtocolError};
use thiserror::Error;

/// Help for the console-level commands.
pub const CONSOLE_HELP: &str = "\
:open                      open another tab and switch to it
:tab <n>                   switch to tab n
:tabs                      list tabs
:create [#code] [codename] create a channel (random code and codename if omitted)
:join <code> [codename]    join a channel
:file <path>               send a file to everyone in the channel
:leave                     leave the channel in this tab
:back                      return to the start screen after an error or teardown
:quit                      leave every channel and exit
anything else              chat text or /command for the active tab (/help)";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Open a new tab and make it active.
    Open,
    /// Make a tab active.
    Switch(usize),
    /// List every tab.
    Tabs,
    /// Create a channel from the active tab.
    Create {
        /// Code to create; random when absent.
        channel_id: Option<ChannelId>,
        /// Display codename; random when absent.
        codename: Option<String>,
    },
    /// Join a channel from the active tab.
    Join {
        /// Code to join.
        channel_id: ChannelId,
        /// Display codename; random when absent.
        codename: Option<String>,
    },
    /// Attach a file from disk.
    File(PathBuf),
    /// Leave the active tab's channel.
    Leave,
    /// Return the active tab to the start screen.
    Back,
    /// Show [`CONSOLE_HELP`].
    Help,
    /// Leave every channel and exit.
    Quit,
    /// Line typed into the active tab.
    Input(String),
}

/// Console parse failures.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Unrecognized `:` command.
    #[error("unknown console command ':{0}' (try :help)")]
    Unknown(String),

    /// Missing or malformed argument.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Channel code did not parse.
    #[error("{0}")]
    Channel(#[from] ProtocolError),
}

/// Parse one console line.
///
/// # Errors
///
/// - `ConsoleError::Unknown` for an unrecognized `:` command
/// - `ConsoleError::Usage` when a required argument is missing
/// - `ConsoleError::Channel` when a channel code is invalid
pub fn parse_console(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let Some(rest) = line.trim().strip_prefix(':') else {
        return Ok(ConsoleCommand::Input(line.to_string()));
    };
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        "open" | "new" => Ok(ConsoleCommand::Open),
        "tab" => {
            args.parse().map(ConsoleCommand::Switch).map_err(|_| ConsoleError::Usage(":tab <n>"))
        },
        "tabs" => Ok(ConsoleCommand::Tabs),
        "create" => {
            // A code is only recognized with its `#` so codenames stay unambiguous.
            let (channel_id, codename) = match args.strip_prefix('#') {
                Some(after) => {
                    let (code, codename) = split_first(after);
                    (Some(ChannelId::parse(code)?), codename)
                },
                None => (None, optional(args)),
            };
            Ok(ConsoleCommand::Create { channel_id, codename })
        },
        "join" => {
            let (code, codename) = split_first(args);
            if code.is_empty() {
                return Err(ConsoleError::Usage(":join <code> [codename]"));
            }
            Ok(ConsoleCommand::Join { channel_id: ChannelId::from_fragment(code)?, codename })
        },
        "file" if args.is_empty() => Err(ConsoleError::Usage(":file <path>")),
        "file" => Ok(ConsoleCommand::File(PathBuf::from(args))),
        "leave" => Ok(ConsoleCommand::Leave),
        "back" => Ok(ConsoleCommand::Back),
        "help" => Ok(ConsoleCommand::Help),
        "quit" | "q" => Ok(ConsoleCommand::Quit),
        other => Err(ConsoleError::Unknown(other.to_string())),
    }
}

/// MIME type guessed from a file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("txt" | "log") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn split_first(args: &str) -> (&str, Option<String>) {
    match args.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, optional(rest)),
        None => (args, None),
    }
}

fn optional(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

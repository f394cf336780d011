//! Command Dispatcher.
//!
//! Parses user input beginning with `/` into a [`Command`]. The first
//! whitespace-delimited word is lower-cased and looked up in a fixed table;
//! everything after it is the argument.

use thiserror::Error;

/// Help text shown by `/help`.
pub const HELP_TEXT: &str = "\
/help                 show this list
/close                leave (creator: end the channel for everyone)
/close_entry          stop admitting newcomers (creator only)
/open_entry           resume admitting newcomers (creator only)
/clear                clear messages here and for everyone
/ping [codename]      measure round-trip time
/fingerprint          show key fingerprints
/members              list participants";

/// Local operations a user can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List commands.
    Help,
    /// Leave the channel; the creator ends it for everyone.
    Close,
    /// Creator stops admitting newcomers.
    CloseEntry,
    /// Creator resumes admitting newcomers.
    OpenEntry,
    /// Clear the message display locally and for every peer.
    Clear,
    /// Probe round-trip time to one participant (by codename) or to all.
    Ping(Option<String>),
    /// Show own and peer key fingerprints.
    Fingerprint,
    /// List participants.
    Members,
}

/// Input that is not a known command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Input does not start with `/`.
    #[error("not a command")]
    NotACommand,

    /// Command name is not in the table.
    #[error("unknown command: /{name}. Type /help for the list")]
    Unknown {
        /// Lower-cased name as typed
        name: String,
    },
}

/// Parse a `/command [args]` line.
pub fn parse_command(input: &str) -> Result<Command, CommandError> {
    let rest = input.trim_start().strip_prefix('/').ok_or(CommandError::NotACommand)?;

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest.trim_end(), ""),
    };
    let name = name.to_lowercase();

    let command = match name.as_str() {
        "help" => Command::Help,
        "close" => Command::Close,
        "close_entry" => Command::CloseEntry,
        "open_entry" => Command::OpenEntry,
        "clear" => Command::Clear,
        "ping" => Command::Ping((!args.is_empty()).then(|| args.to_string())),
        "fingerprint" => Command::Fingerprint,
        "members" => Command::Members,
        _ => return Err(CommandError::Unknown { name }),
    };

    Ok(command)
}

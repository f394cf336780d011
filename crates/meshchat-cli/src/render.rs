//! Plain-text rendering of presentation updates.

use meshchat_core::{MessageKind, UiUpdate};

/// Text for one update, or `None` for updates the console does not show.
///
/// Membership changes are already announced as system lines and can be
/// listed with `/members`, so the membership view itself is not rendered.
pub fn render(update: &UiUpdate) -> Option<String> {
    match update {
        UiUpdate::AppendMessage { kind, text, sender, unverified } => {
            let line = match kind {
                MessageKind::Own => format!("> {text}"),
                MessageKind::Peer => format!("{}: {text}", sender.as_deref().unwrap_or("?")),
                MessageKind::System => format!("* {text}"),
                MessageKind::Error => format!("! {text}"),
            };
            Some(mark_unverified(line, *unverified))
        },
        UiUpdate::AppendFile(file) => {
            let line = format!(
                "{} sent {} ({}, {} bytes)",
                file.sender,
                file.file_name,
                file.mime_type,
                file.data.len()
            );
            Some(mark_unverified(line, file.unverified))
        },
        UiUpdate::ClearMessages => Some("-- messages cleared --".to_string()),
        UiUpdate::SetConnectionStatus(true) => Some("* connected".to_string()),
        UiUpdate::SetConnectionStatus(false) => Some("* disconnected".to_string()),
        UiUpdate::ShowScreen(state) => Some(format!("[{state}]")),
        UiUpdate::UpdateMembership { .. } => None,
    }
}

fn mark_unverified(line: String, unverified: bool) -> String {
    if unverified { format!("{line} [unverified sender]") } else { line }
}

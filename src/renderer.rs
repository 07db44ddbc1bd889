use crate::api::{Content, Msg};
use chrono::DateTime;
use std::io::Write;

/// Render one message as one log line: `[timestamp] sender: body`.
///
/// `stored_name` is the filename an attachment was (or will be) saved under,
/// so the log references the file actually on disk; `None` falls back to the
/// attachment's original filename.
pub fn write_message_line<W: Write>(
    writer: &mut W,
    msg: &Msg,
    stored_name: Option<&str>,
) -> std::io::Result<()> {
    let body = match &msg.content {
        Content::Text { text } => one_line(&text.body),

        Content::Attachment { attachment } => {
            let name = stored_name.unwrap_or(&attachment.object.filename);
            match attachment.object.mime_type.as_deref() {
                Some(mime) => format!("[attachment {}: {}]", mime, one_line(name)),
                None => format!("[attachment: {}]", one_line(name)),
            }
        }

        Content::AttachmentUploaded {
            attachment_uploaded,
        } => format!(
            "[attachment uploaded: {}]",
            one_line(&attachment_uploaded.object.filename)
        ),

        Content::Reaction { reaction } => {
            format!("reacted to message {} with {}", reaction.m, one_line(&reaction.b))
        }

        Content::Edit { edit } => {
            format!("edited message {}: {}", edit.message_id, one_line(&edit.body))
        }

        Content::Delete { delete } => {
            let ids: Vec<String> = delete.message_ids.iter().map(u64::to_string).collect();
            format!("deleted messages {}", ids.join(", "))
        }

        Content::Unfurl { unfurl } => format!("unfurled {}", one_line(&unfurl.unfurl.url)),

        Content::Unknown => "(unsupported message type)".to_string(),
    };

    writeln!(
        writer,
        "[{}] {}: {}",
        format_sent_at(msg.sent_at),
        msg.sender.username,
        body
    )
}

fn format_sent_at(sent_at: i64) -> String {
    match DateTime::from_timestamp(sent_at, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => sent_at.to_string(),
    }
}

/// Embedded newlines would break the one-line-per-message format.
fn one_line(s: &str) -> String {
    s.replace('\n', "\\n")
}

/// Type definitions for the `keybase chat api` JSON command interface.
///
/// The Keybase client daemon exposes chat queries through
/// `keybase chat api -m '<json>'`: a method name plus options in, a JSON
/// document out. Only the two methods this tool issues are modeled:
///
/// ```json
/// {"method": "read", "params": {"options": {
///     "channel": {"name": "alice,bob"},
///     "pagination": {"num": 1000, "next": "<handle>"}}}}
///
/// {"method": "download", "params": {"options": {
///     "channel": {"name": "alice,bob"},
///     "message_id": 42, "output": "photo.jpg"}}}
/// ```
///
/// A `read` response carries `result.messages` (a list of `{"msg": {...}}`
/// envelopes) and `result.pagination`. Responses are kept verbatim as
/// `serde_json::Value` for the raw archive; the types below are the typed
/// view used for rendering and attachment handling. Unknown fields are
/// ignored on the typed path, never dropped from the archive.
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request side
// ---------------------------------------------------------------------------

/// A single `keybase chat api` invocation payload.
#[derive(Debug, Serialize)]
pub struct ApiRequest<'a> {
    pub method: &'a str,
    pub params: Params<'a>,
}

#[derive(Debug, Serialize)]
pub struct Params<'a> {
    pub options: Options<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Options<'a> {
    Read {
        channel: Channel<'a>,
        pagination: Pagination<'a>,
    },
    Download {
        channel: Channel<'a>,
        message_id: u64,
        output: &'a str,
    },
}

#[derive(Debug, Serialize)]
pub struct Channel<'a> {
    pub name: &'a str,
}

/// The daemon treats an empty `next` handle as "start from the newest page".
#[derive(Debug, Serialize)]
pub struct Pagination<'a> {
    pub num: u32,
    pub next: &'a str,
}

impl<'a> ApiRequest<'a> {
    pub fn read(channel: &'a str, num: u32, next: &'a str) -> Self {
        Self {
            method: "read",
            params: Params {
                options: Options::Read {
                    channel: Channel { name: channel },
                    pagination: Pagination { num, next },
                },
            },
        }
    }

    pub fn download(channel: &'a str, message_id: u64, output: &'a str) -> Self {
        Self {
            method: "download",
            params: Params {
                options: Options::Download {
                    channel: Channel { name: channel },
                    message_id,
                    output,
                },
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Response side
// ---------------------------------------------------------------------------

/// The `result` object of a `read` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadResult {
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
    pub pagination: Option<PaginationInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationInfo {
    pub next: Option<String>,
    #[serde(default)]
    pub last: bool,
}

/// Wrapper around each entry of `result.messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEnvelope {
    pub msg: Msg,
}

/// The fields of a message this tool actually reads. The daemon sends many
/// more (`conversation_id`, `channel`, device info, ...); those survive only
/// in the verbatim archive.
#[derive(Debug, Clone, Deserialize)]
pub struct Msg {
    pub id: u64,
    /// Unix seconds.
    pub sent_at: i64,
    pub sender: Sender,
    pub content: Content,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub username: String,
}

/// Message payload, discriminated by `content.type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text {
        text: TextBody,
    },

    Attachment {
        attachment: AttachmentBody,
    },

    #[serde(rename = "attachmentuploaded")]
    AttachmentUploaded {
        attachment_uploaded: AttachmentBody,
    },

    Reaction {
        reaction: ReactionBody,
    },

    Edit {
        edit: EditBody,
    },

    Delete {
        delete: DeleteBody,
    },

    Unfurl {
        unfurl: UnfurlBody,
    },

    /// Any content type this tool does not render specially
    /// (system messages, flips, payments, ...).
    #[serde(other)]
    Unknown,
}

impl Content {
    /// Original filename of a downloadable attachment.
    /// `attachmentuploaded` is a status notice, not a downloadable blob.
    pub fn attachment_filename(&self) -> Option<&str> {
        match self {
            Content::Attachment { attachment } => Some(&attachment.object.filename),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentBody {
    pub object: AttachmentObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentObject {
    pub filename: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// `m` is the id of the message reacted to, `b` the reaction body (emoji).
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionBody {
    pub m: u64,
    pub b: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditBody {
    #[serde(rename = "messageID")]
    pub message_id: u64,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteBody {
    #[serde(rename = "messageIDs")]
    pub message_ids: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnfurlBody {
    pub unfurl: UnfurlInner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnfurlInner {
    #[serde(default)]
    pub url: String,
}

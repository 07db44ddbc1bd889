use crate::api::{ApiRequest, MessageEnvelope, Msg, ReadResult};
use eyre::{Context, Result, eyre};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One page of message history, in the order the daemon returned it
/// (newest first).
pub struct ReadPage {
    pub messages: Vec<FetchedMessage>,
    /// Handle for the next (older) page, absent on the final page.
    pub next: Option<String>,
    pub last: bool,
}

/// A message entry kept both verbatim (for the raw archive) and typed
/// (for rendering and attachment handling).
pub struct FetchedMessage {
    pub raw: Value,
    pub msg: Msg,
}

/// The slice of the external chat interface this tool depends on.
/// Implemented by [`KeybaseCli`]; tests substitute an in-memory fake.
pub trait ChatApi {
    fn read_page(&self, channel: &str, num: u32, next: Option<&str>) -> Result<ReadPage>;
    fn download(&self, channel: &str, message_id: u64, output: &Path) -> Result<()>;
}

/// Talks to the local Keybase daemon through `keybase chat api -m <json>`.
pub struct KeybaseCli {
    binary: PathBuf,
}

impl KeybaseCli {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn run(&self, request: &ApiRequest) -> Result<Value> {
        let payload =
            serde_json::to_string(request).wrap_err("Failed to serialize API request")?;

        let output = Command::new(&self.binary)
            .args(["chat", "api", "-m", &payload])
            .output()
            .wrap_err_with(|| {
                format!(
                    "Failed to run {} — is Keybase installed and on PATH?",
                    self.binary.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(eyre!(
                "keybase chat api exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let value: Value = serde_json::from_slice(&output.stdout)
            .wrap_err("keybase chat api returned undecodable output")?;

        // The daemon reports failures as a JSON error object with exit code 0.
        if let Some(err) = value.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(eyre!("keybase chat api error: {}", message));
        }

        Ok(value)
    }
}

impl ChatApi for KeybaseCli {
    fn read_page(&self, channel: &str, num: u32, next: Option<&str>) -> Result<ReadPage> {
        let request = ApiRequest::read(channel, num, next.unwrap_or(""));
        let response = self.run(&request)?;
        parse_read_page(response)
    }

    fn download(&self, channel: &str, message_id: u64, output: &Path) -> Result<()> {
        let output_str = output.to_str().ok_or_else(|| {
            eyre!("Attachment path is not valid UTF-8: {}", output.display())
        })?;
        let request = ApiRequest::download(channel, message_id, output_str);
        self.run(&request)?;
        Ok(())
    }
}

/// Split a full `read` response into verbatim entries plus their typed views.
pub fn parse_read_page(response: Value) -> Result<ReadPage> {
    let result = response
        .get("result")
        .cloned()
        .ok_or_else(|| eyre!("Message history response has no result field"))?;

    let read: ReadResult =
        serde_json::from_value(result).wrap_err("Malformed message history response")?;

    let mut messages = Vec::with_capacity(read.messages.len());
    for raw in read.messages {
        let envelope: MessageEnvelope = serde_json::from_value(raw.clone())
            .wrap_err("Malformed message entry in history response")?;
        messages.push(FetchedMessage {
            raw,
            msg: envelope.msg,
        });
    }

    let (next, last) = match read.pagination {
        Some(p) => (p.next.filter(|n| !n.is_empty()), p.last),
        // No pagination object means the daemon sent everything in one page.
        None => (None, true),
    };

    Ok(ReadPage {
        messages,
        next,
        last,
    })
}

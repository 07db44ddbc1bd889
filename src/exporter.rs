use crate::client::{ChatApi, FetchedMessage};
use crate::renderer;
use crate::utils::{ExportConfig, NameRegistry};
use eyre::{Context, Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The main entry point for the export logic.
///
/// Creates the conversation directory, fetches the complete history through
/// the external interface, writes `<stem>.json` (verbatim) and `<stem>.log`
/// (chronological), then downloads every referenced attachment. Fail-fast:
/// the first daemon or filesystem error aborts the run.
pub fn execute<A: ChatApi>(api: &A, config: &ExportConfig) -> Result<()> {
    let stem = config.file_stem();
    if stem.is_empty() {
        return Err(eyre!("Conversation identifier is empty"));
    }

    let conv_dir = config.conversation_dir();
    fs::create_dir_all(&conv_dir).wrap_err_with(|| {
        format!("Failed to create output directory: {}", conv_dir.display())
    })?;

    let messages = fetch_history(api, config)?;

    write_raw_json(&conv_dir.join(format!("{}.json", stem)), &messages)?;

    // Ascending chronological order for the log and for attachment naming;
    // ties broken by message id so reruns are deterministic.
    let mut order: Vec<usize> = (0..messages.len()).collect();
    order.sort_by_key(|&i| (messages[i].msg.sent_at, messages[i].msg.id));

    let attachments = allocate_attachments(&messages, &order, &conv_dir);

    write_log(&conv_dir.join(format!("{}.log", stem)), &messages, &order, &attachments)?;

    let mut downloaded = 0usize;
    if !config.skip_attachments {
        downloaded = download_attachments(api, config, &order, &attachments)?;
    }

    if !config.quiet {
        eprintln!(
            "Done. {} message(s), {} attachment(s) written to {}",
            messages.len(),
            downloaded,
            conv_dir.display()
        );
    }

    Ok(())
}

/// Fetch the full history, following pagination handles until the daemon
/// reports the last page. Pages are concatenated in the order the daemon
/// returns them; no deduplication.
fn fetch_history<A: ChatApi>(api: &A, config: &ExportConfig) -> Result<Vec<FetchedMessage>> {
    let spinner = if config.quiet {
        ProgressBar::hidden()
    } else {
        let s = ProgressBar::new_spinner();
        s.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        s.set_message("Fetching messages...");
        s.enable_steady_tick(Duration::from_millis(80));
        s
    };

    let mut messages = Vec::new();
    let mut next: Option<String> = None;

    loop {
        let page = api.read_page(&config.conversation, config.page_size, next.as_deref())?;
        messages.extend(page.messages);
        spinner.set_message(format!("Fetched {} messages...", messages.len()));

        if page.last {
            break;
        }
        let Some(handle) = page.next else {
            break;
        };
        // A repeated handle would fetch the same page forever; halt instead.
        if next.as_deref() == Some(handle.as_str()) {
            break;
        }
        next = Some(handle);
    }

    spinner.finish_and_clear();
    Ok(messages)
}

/// Write the message list exactly as the daemon returned it, one JSON array.
fn write_raw_json(path: &Path, messages: &[FetchedMessage]) -> Result<()> {
    let raws: Vec<&Value> = messages.iter().map(|m| &m.raw).collect();
    let file = File::create(path)
        .wrap_err_with(|| format!("Failed to create: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &raws).wrap_err("Failed to write raw message history")?;
    writer.write_all(b"\n").wrap_err("Failed to write raw message history")?;
    writer.flush().wrap_err("Failed to flush raw message history")
}

/// Pre-allocate on-disk names for every downloadable attachment, in log
/// order, so the log can reference the exact files written later.
/// Returns message index → (message id, filename, full path).
fn allocate_attachments(
    messages: &[FetchedMessage],
    order: &[usize],
    conv_dir: &Path,
) -> HashMap<usize, (u64, String, PathBuf)> {
    let mut registry = NameRegistry::default();
    let mut allocated = HashMap::new();
    for &i in order {
        let msg = &messages[i].msg;
        if let Some(original) = msg.content.attachment_filename() {
            let name = registry.allocate(original);
            let path = conv_dir.join(&name);
            allocated.insert(i, (msg.id, name, path));
        }
    }
    allocated
}

fn write_log(
    path: &Path,
    messages: &[FetchedMessage],
    order: &[usize],
    attachments: &HashMap<usize, (u64, String, PathBuf)>,
) -> Result<()> {
    let file = File::create(path)
        .wrap_err_with(|| format!("Failed to create: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for &i in order {
        let stored_name = attachments.get(&i).map(|(_, name, _)| name.as_str());
        renderer::write_message_line(&mut writer, &messages[i].msg, stored_name)
            .wrap_err("Failed to write log line")?;
    }
    writer.flush().wrap_err("Failed to flush log file")
}

fn download_attachments<A: ChatApi>(
    api: &A,
    config: &ExportConfig,
    order: &[usize],
    attachments: &HashMap<usize, (u64, String, PathBuf)>,
) -> Result<usize> {
    let pb = if config.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(attachments.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
            )
            .unwrap()
            .progress_chars("=>-"),
        );
        bar
    };

    let mut downloaded = 0usize;
    for &i in order {
        let Some((message_id, name, path)) = attachments.get(&i) else {
            continue;
        };
        api.download(&config.conversation, *message_id, path)
            .wrap_err_with(|| format!("Failed to download attachment: {}", name))?;
        downloaded += 1;
        if config.verbose {
            pb.println(format!("Saved: {}", name));
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ReadPage, parse_read_page};
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    /// Canned stand-in for the Keybase daemon. Pages are full `read`
    /// response documents whose `next` handles are page indices; downloads
    /// write canned blobs keyed by message id.
    struct FakeApi {
        pages: Vec<Value>,
        blobs: HashMap<u64, Vec<u8>>,
        reads: RefCell<usize>,
    }

    impl FakeApi {
        fn single_page(messages: Vec<Value>) -> Self {
            Self {
                pages: vec![page(messages, None, true)],
                blobs: HashMap::new(),
                reads: RefCell::new(0),
            }
        }
    }

    impl ChatApi for FakeApi {
        fn read_page(&self, _channel: &str, _num: u32, next: Option<&str>) -> Result<ReadPage> {
            *self.reads.borrow_mut() += 1;
            let idx: usize = match next {
                Some(handle) => handle.parse().unwrap(),
                None => 0,
            };
            parse_read_page(self.pages[idx].clone())
        }

        fn download(&self, _channel: &str, message_id: u64, output: &Path) -> Result<()> {
            let blob = self
                .blobs
                .get(&message_id)
                .ok_or_else(|| eyre!("no blob for message {}", message_id))?;
            fs::write(output, blob).wrap_err("write blob")
        }
    }

    struct FailingApi;

    impl ChatApi for FailingApi {
        fn read_page(&self, _: &str, _: u32, _: Option<&str>) -> Result<ReadPage> {
            Err(eyre!("keybase chat api error: daemon unreachable"))
        }

        fn download(&self, _: &str, _: u64, _: &Path) -> Result<()> {
            Err(eyre!("keybase chat api error: daemon unreachable"))
        }
    }

    fn page(messages: Vec<Value>, next: Option<&str>, last: bool) -> Value {
        json!({"result": {
            "messages": messages,
            "pagination": {"next": next, "last": last},
        }})
    }

    fn text_msg(id: u64, sent_at: i64, sender: &str, body: &str) -> Value {
        json!({"msg": {
            "id": id,
            "sent_at": sent_at,
            "sender": {"username": sender},
            "content": {"type": "text", "text": {"body": body}},
        }})
    }

    fn attachment_msg(id: u64, sent_at: i64, sender: &str, filename: &str) -> Value {
        json!({"msg": {
            "id": id,
            "sent_at": sent_at,
            "sender": {"username": sender},
            "content": {"type": "attachment", "attachment": {
                "object": {"filename": filename, "mimeType": "image/jpeg"},
            }},
        }})
    }

    fn config(dir: &Path) -> ExportConfig {
        ExportConfig {
            conversation: "alice,bob".into(),
            output_dir: Some(dir.join("alice,bob")),
            page_size: 1000,
            skip_attachments: false,
            verbose: false,
            quiet: true,
        }
    }

    #[test]
    fn one_line_per_message_in_ascending_order() {
        // Daemon order is newest-first, split across two pages.
        let api = FakeApi {
            pages: vec![
                page(
                    vec![
                        text_msg(3, 1600000200, "alice", "third"),
                        text_msg(2, 1600000100, "bob", "second"),
                    ],
                    Some("1"),
                    false,
                ),
                page(vec![text_msg(1, 1600000000, "alice", "first")], None, true),
            ],
            blobs: HashMap::new(),
            reads: RefCell::new(0),
        };
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());

        execute(&api, &cfg).unwrap();

        assert_eq!(*api.reads.borrow(), 2);
        let log = fs::read_to_string(tmp.path().join("alice,bob/alice,bob.log")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("alice: first"));
        assert!(lines[1].ends_with("bob: second"));
        assert!(lines[2].ends_with("alice: third"));
    }

    #[test]
    fn raw_json_preserves_daemon_fields_verbatim() {
        let mut extra = text_msg(1, 1600000000, "alice", "hi");
        extra["msg"]["conversation_id"] = json!("00deadbeef");
        extra["msg"]["unread"] = json!(false);
        let api = FakeApi::single_page(vec![text_msg(2, 1600000100, "bob", "yo"), extra]);
        let tmp = TempDir::new().unwrap();

        execute(&api, &config(tmp.path())).unwrap();

        let raw = fs::read_to_string(tmp.path().join("alice,bob/alice,bob.json")).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 2);
        // Daemon order, not log order.
        assert_eq!(parsed[0]["msg"]["id"], json!(2));
        assert_eq!(parsed[1]["msg"]["conversation_id"], json!("00deadbeef"));
        assert_eq!(parsed[1]["msg"]["unread"], json!(false));
    }

    #[test]
    fn duplicate_attachment_filenames_do_not_overwrite() {
        let mut api = FakeApi::single_page(vec![
            attachment_msg(2, 1600000100, "bob", "photo.jpg"),
            attachment_msg(1, 1600000000, "alice", "photo.jpg"),
        ]);
        api.blobs.insert(1, b"first blob".to_vec());
        api.blobs.insert(2, b"second blob".to_vec());
        let tmp = TempDir::new().unwrap();

        execute(&api, &config(tmp.path())).unwrap();

        let dir = tmp.path().join("alice,bob");
        // Older message claims the bare name.
        assert_eq!(fs::read(dir.join("photo.jpg")).unwrap(), b"first blob");
        assert_eq!(fs::read(dir.join("photo_1.jpg")).unwrap(), b"second blob");

        let log = fs::read_to_string(dir.join("alice,bob.log")).unwrap();
        assert!(log.contains("[attachment image/jpeg: photo.jpg]"));
        assert!(log.contains("[attachment image/jpeg: photo_1.jpg]"));
    }

    #[test]
    fn skip_attachments_keeps_placeholders_only() {
        let mut api =
            FakeApi::single_page(vec![attachment_msg(1, 1600000000, "alice", "photo.jpg")]);
        api.blobs.insert(1, b"blob".to_vec());
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(tmp.path());
        cfg.skip_attachments = true;

        execute(&api, &cfg).unwrap();

        let dir = tmp.path().join("alice,bob");
        assert!(!dir.join("photo.jpg").exists());
        let log = fs::read_to_string(dir.join("alice,bob.log")).unwrap();
        assert!(log.contains("[attachment image/jpeg: photo.jpg]"));
    }

    #[test]
    fn empty_conversation_yields_empty_log_and_valid_json() {
        let api = FakeApi::single_page(vec![]);
        let tmp = TempDir::new().unwrap();

        execute(&api, &config(tmp.path())).unwrap();

        let dir = tmp.path().join("alice,bob");
        assert_eq!(fs::read_to_string(dir.join("alice,bob.log")).unwrap(), "");
        let parsed: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(dir.join("alice,bob.json")).unwrap())
                .unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn rerun_is_byte_identical() {
        let mut api = FakeApi::single_page(vec![
            text_msg(2, 1600000100, "bob", "yo"),
            attachment_msg(1, 1600000000, "alice", "photo.jpg"),
        ]);
        api.blobs.insert(1, b"blob".to_vec());
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let dir = tmp.path().join("alice,bob");

        execute(&api, &cfg).unwrap();
        let log1 = fs::read(dir.join("alice,bob.log")).unwrap();
        let json1 = fs::read(dir.join("alice,bob.json")).unwrap();

        execute(&api, &cfg).unwrap();
        assert_eq!(fs::read(dir.join("alice,bob.log")).unwrap(), log1);
        assert_eq!(fs::read(dir.join("alice,bob.json")).unwrap(), json1);
    }

    #[test]
    fn repeated_pagination_handle_halts() {
        // Both pages hand back the handle "0": without the guard this would
        // re-fetch page 0 forever.
        let api = FakeApi {
            pages: vec![page(
                vec![text_msg(1, 1600000000, "alice", "hi")],
                Some("0"),
                false,
            )],
            blobs: HashMap::new(),
            reads: RefCell::new(0),
        };
        let tmp = TempDir::new().unwrap();

        execute(&api, &config(tmp.path())).unwrap();

        assert_eq!(*api.reads.borrow(), 2);
        let log = fs::read_to_string(tmp.path().join("alice,bob/alice,bob.log")).unwrap();
        assert_eq!(log.lines().count(), 2);
    }

    #[test]
    fn daemon_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());

        let err = execute(&FailingApi, &cfg).unwrap_err();
        assert!(err.to_string().contains("daemon unreachable"));

        // Fail-fast before any artifact is written.
        let dir = tmp.path().join("alice,bob");
        assert!(!dir.join("alice,bob.log").exists());
        assert!(!dir.join("alice,bob.json").exists());
    }

    #[test]
    fn empty_identifier_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let cfg = ExportConfig {
            conversation: String::new(),
            output_dir: Some(tmp.path().join("out")),
            page_size: 1000,
            skip_attachments: false,
            verbose: false,
            quiet: true,
        };
        assert!(execute(&FakeApi::single_page(vec![]), &cfg).is_err());
    }
}

use std::collections::HashSet;
use std::path::PathBuf;

/// Configuration required to run the export process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone)]
pub struct ExportConfig {
    /// Comma-separated participant usernames, e.g. "alice,bob".
    pub conversation: String,
    /// Overrides the default directory named after the conversation.
    pub output_dir: Option<PathBuf>,
    pub page_size: u32,
    pub skip_attachments: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl ExportConfig {
    /// Filename stem shared by `<stem>.json` and `<stem>.log`.
    pub fn file_stem(&self) -> String {
        sanitize_identifier(&self.conversation)
    }

    pub fn conversation_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.file_stem()))
    }
}

/// Make a conversation identifier safe to use as a directory/file name:
/// leading dots are stripped, path separators replaced.
pub fn sanitize_identifier(id: &str) -> String {
    id.trim_start_matches('.').replace('/', "_")
}

/// Allocates collision-free attachment filenames within one export run.
///
/// Names derive from the attachment's original filename; a duplicate gets a
/// numeric suffix before the extension (`photo.jpg`, `photo_1.jpg`, ...).
/// Deterministic for a fixed message order, so reruns produce the same names.
#[derive(Default)]
pub struct NameRegistry {
    taken: HashSet<String>,
}

impl NameRegistry {
    pub fn allocate(&mut self, original: &str) -> String {
        let mut base = original.replace('/', "_");
        if base.is_empty() {
            base = "attachment".to_string();
        }
        if self.taken.insert(base.clone()) {
            return base;
        }

        let (stem, ext) = match base.rfind('.') {
            Some(pos) if pos > 0 => (&base[..pos], &base[pos..]),
            _ => (base.as_str(), ""),
        };
        let mut n = 1u32;
        loop {
            let candidate = format!("{}_{}{}", stem, n, ext);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

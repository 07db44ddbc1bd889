//! # keybase-chat-export
//!
//! A CLI tool that exports [Keybase](https://keybase.io) chat conversations to local files.
//!
//! ## What it does
//!
//! The Keybase client daemon exposes chat queries through `keybase chat api`.
//! This tool reads a conversation's complete message history through that
//! interface (following pagination) and writes three artifacts into a
//! directory named after the conversation:
//!
//! - `<conversation>.json` — the message list verbatim, as the daemon returned it
//! - `<conversation>.log` — one line per message, oldest first:
//!   `[2020-09-13 12:26:40] alice: hello`
//! - every attachment referenced in the history, named after its original
//!   filename (duplicates get a numeric suffix, nothing is overwritten)
//!
//! The daemon is only queried, never written to.
//!
//! ## Usage
//!
//! ```sh
//! # Export a conversation into ./alice,bob/
//! keybase-chat-export alice,bob
//!
//! # Custom output directory, no attachment blobs
//! keybase-chat-export alice,bob ~/backups/alice --skip-attachments
//! ```
//!
//! Preferences can be persisted in `~/.config/keybase-chat-export/config.toml`.
//!
//! ## Compatibility
//!
//! Requires a locally installed, authenticated Keybase client; the `keybase`
//! binary must be on `PATH` (or passed with `--keybase-bin`). A failed run may
//! leave a partially populated directory — reruns overwrite at the file level,
//! so simply run the export again.

mod api;
mod client;
mod exporter;
mod renderer;
mod utils;

use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Export a Keybase chat conversation to a plain-text log, a raw JSON
/// archive, and its attachment files. Requires a running, authenticated
/// Keybase client.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Conversation identifier: comma-separated participant usernames
    /// (e.g. "alice,bob").
    #[arg(value_name = "CONVERSATION")]
    conversation: String,

    /// Directory to write the export into.
    /// Defaults to a directory named after the conversation.
    #[arg(value_name = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Path to the keybase executable.
    /// Defaults to `keybase` on PATH.
    #[arg(long, value_name = "PATH")]
    keybase_bin: Option<PathBuf>,

    /// Messages fetched per paginated history call.
    #[arg(long, value_name = "N")]
    page_size: Option<u32>,

    /// Do not download attachment blobs; placeholder lines still appear in the log.
    #[arg(long)]
    skip_attachments: bool,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/keybase-chat-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print each attachment file written.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress standard output (progress bars).
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    keybase_bin: Option<PathBuf>,
    page_size: Option<u32>,
    skip_attachments: Option<bool>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        // Search: XDG/OS config dir, then nothing
        dirs::config_dir()
            .map(|d| d.join("keybase-chat-export/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve the keybase binary (CLI > Config > PATH lookup)
    let keybase_bin = cli
        .keybase_bin
        .or(file_cfg.keybase_bin)
        .unwrap_or_else(|| PathBuf::from("keybase"));

    // 3. Resolve pagination size (CLI > Config > Default)
    let page_size = cli.page_size.or(file_cfg.page_size).unwrap_or(1000);
    if page_size == 0 {
        return Err(eyre!("page-size must be at least 1"));
    }

    let skip_attachments = cli.skip_attachments || file_cfg.skip_attachments.unwrap_or(false);

    // 4. Build the Export Config
    let config = utils::ExportConfig {
        conversation: cli.conversation,
        output_dir: cli.output_dir,
        page_size,
        skip_attachments,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    // 5. Run the Business Logic
    let client = client::KeybaseCli::new(keybase_bin);
    exporter::execute(&client, &config)
}

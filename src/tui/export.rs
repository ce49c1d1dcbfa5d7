use crate::model::Feature;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;
use time::OffsetDateTime;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

fn export_file_name(feature: Feature, at: OffsetDateTime) -> String {
    let slug = match feature {
        Feature::Translate => "translation",
        Feature::Summarize => "summary",
        Feature::VideoSummarize => "video-summary",
    };
    format!(
        "llm-hub-{slug}-{:04}{:02}{:02}-{:02}{:02}{:02}.txt",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// Write a page's output to `dir`. Returns the absolute path of the file.
pub fn export_output(dir: &Path, feature: Feature, output: &str) -> Result<PathBuf> {
    if output.trim().is_empty() {
        return Err(anyhow::anyhow!("nothing to save yet"));
    }
    let at = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let path = dir.join(export_file_name(feature, at));
    std::fs::write(&path, format!("{output}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Export into the current directory.
pub fn export_output_here(feature: Feature, output: &str) -> Result<PathBuf> {
    let current_dir = std::env::current_dir().context("get current directory")?;
    export_output(&current_dir, feature, output)
}

/// Initialize the clipboard manager thread if not already initialized.
/// This creates a background thread that processes clipboard operations sequentially,
/// keeping each clipboard instance alive for a sufficient duration.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        // Clipboard managers on Linux read lazily from the owning instance.
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Copy text to clipboard. Returns after queuing the operation.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}

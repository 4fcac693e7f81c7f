//! Terminal implementation of the dialog surface

use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::warn;

use crate::surface::{Surface, TITLE_FAILED, TITLE_SUCCESS};

const PROMPT: &[u8] = b"[y/N] ";

/// Prompts on stdin and prints to stdout
#[derive(Default)]
pub struct TerminalSurface {
    // Dialogs from concurrent attempts must not interleave on the terminal
    lock: Mutex<()>,

    /// Answer every confirmation with this value instead of prompting
    pub assume_yes: Option<bool>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assume_yes(assume_yes: bool) -> Self {
        Self {
            lock: Mutex::new(()),
            assume_yes: Some(assume_yes),
        }
    }
}

/// Parse a yes/no answer. Anything other than yes is a no.
pub fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Write the inline answer prompt. Returns false if it could not be shown.
async fn write_prompt<W: AsyncWrite + Unpin>(out: &mut W) -> bool {
    if let Err(e) = out.write_all(PROMPT).await {
        warn!("Failed to write confirmation prompt: {}", e);
        return false;
    }
    if let Err(e) = out.flush().await {
        warn!("Failed to flush confirmation prompt: {}", e);
        return false;
    }
    true
}

#[async_trait]
impl Surface for TerminalSurface {
    async fn confirm(&self, title: &str, message: &str) -> bool {
        let _guard = self.lock.lock().await;

        println!("{}", title.bold().yellow());
        println!("{}", message);
        if let Some(answer) = self.assume_yes {
            println!("[y/N] {}", if answer { "y" } else { "n" });
            return answer;
        }

        write_prompt(&mut tokio::io::stdout()).await;

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(_) => parse_answer(&line),
            Err(e) => {
                warn!("Failed to read confirmation: {}", e);
                false
            }
        }
    }

    async fn show_message(&self, title: &str, lines: &[String]) {
        let _guard = self.lock.lock().await;

        let heading = match title {
            TITLE_SUCCESS => title.bold().green(),
            TITLE_FAILED => title.bold().red(),
            _ if title.contains("rror") => title.bold().red(),
            _ => title.bold(),
        };
        println!("{}", heading);
        for line in lines {
            println!("  {}", line);
        }
    }
}

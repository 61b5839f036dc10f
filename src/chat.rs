// Interactive chat session: reads ideas line by line, prints generated posts
// and offers to save them to a text file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{info, warn};

use crate::client::GenerationClient;
use crate::constants::{DEFAULT_SAVE_NAME, SAVE_EXTENSION};
use crate::error::GenerationError;
use crate::post::GeneratedPost;

pub const WELCOME: &str = r#"
+------------------------------------------------------------------+
|                                                                  |
|                  POSTCRAFT - SOCIAL POST GENERATOR               |
|                                                                  |
+------------------------------------------------------------------+

Welcome! Describe an idea and get a ready-to-publish professional post.

Features:
  * Professional content written for engagement
  * Strict validation of format and structure
  * Relevant hashtags generated automatically
  * Automatic categorization of the content

Instructions:
  * Describe the idea or topic of the post you want to create
  * Be as specific as possible for better results
  * Type 'exit' or 'quit' to leave
  * Type 'help' to show the available commands
"#;

pub const HELP: &str = r#"
===============================================================

USAGE

Commands:
  * exit / quit / salir     -> leave the program
  * help / ayuda            -> show this help
  * examples / ejemplos     -> show sample ideas

How to use the generator:
  1. Describe your idea clearly and concisely
  2. Mention the target audience if you have one
  3. Say which tone you prefer (inspiring, educational, ...)
  4. A complete post is generated automatically

Example input:
  "A post about why AI matters in modern software development,
   aimed at programmers who are just starting out"

===============================================================
"#;

pub const EXAMPLES: &str = r#"
===============================================================

SAMPLE IDEAS

1. Technology:
   "Five AI trends that will change software development next year"

2. Professional development:
   "How to get past impostor syndrome in a tech career"

3. Leadership:
   "Lessons learned after leading remote teams for three years"

4. Marketing:
   "Why content marketing still matters in the age of AI"

5. Innovation:
   "How we built a culture of innovation in our startup"

===============================================================
"#;

pub const GOODBYE: &str = r#"
+------------------------------------------------------------------+
|                                                                  |
|                          See you soon!                           |
|                                                                  |
|              Thanks for using postcraft. Keep sharing.           |
|                                                                  |
+------------------------------------------------------------------+
"#;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Exit,
    Help,
    Examples,
    Empty,
    Idea(String),
}

fn parse_command(line: &str) -> Command {
    let input = line.trim();
    match input.to_lowercase().as_str() {
        "" => Command::Empty,
        "exit" | "quit" | "salir" => Command::Exit,
        "help" | "ayuda" => Command::Help,
        "examples" | "ejemplos" => Command::Examples,
        _ => Command::Idea(input.to_string()),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "si" | "sí"
    )
}

/// File name used when saving: blank falls back to the default, and the
/// `.txt` extension (in any letter case) is added unless already present.
pub fn file_name(name: &str) -> String {
    let name = name.trim();
    let stem = if name.is_empty() {
        DEFAULT_SAVE_NAME
    } else {
        name
    };
    let extension = format!(".{SAVE_EXTENSION}");
    if stem.to_ascii_lowercase().ends_with(&extension) {
        stem.to_string()
    } else {
        format!("{stem}{extension}")
    }
}

/// Writes the rendered post as UTF-8 text into `dir`.
pub fn save_post(post: &GeneratedPost, dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(file_name(name));
    fs::write(&path, post.render())
        .with_context(|| format!("Failed to write post to {}", path.display()))?;
    info!(path = %path.display(), "post saved");
    Ok(path)
}

/// Prints an error together with its remediation hint.
pub fn write_failure(out: &mut impl Write, err: &GenerationError) -> std::io::Result<()> {
    writeln!(out, "\nError: {err}")?;
    writeln!(out, "Hint: {}", err.remediation())
}

pub struct ChatSession<'a, R, W> {
    client: &'a GenerationClient,
    lines: Lines<R>,
    out: W,
    save_dir: PathBuf,
}

impl<'a, R, W> ChatSession<'a, R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(
        client: &'a GenerationClient,
        input: R,
        out: W,
        save_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            lines: input.lines(),
            out,
            save_dir: save_dir.into(),
        }
    }

    /// Runs until the user exits or input ends.
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting chat session...");
        let rule = "-".repeat(70);
        loop {
            write!(self.out, "\n{rule}\n\nDescribe your post idea:\n> ")?;
            self.out.flush()?;

            let Some(line) = self.next_line().await? else {
                break;
            };

            match parse_command(&line) {
                Command::Exit => break,
                Command::Help => writeln!(self.out, "{HELP}")?,
                Command::Examples => writeln!(self.out, "{EXAMPLES}")?,
                Command::Empty => writeln!(self.out, "The idea can't be empty. Try again.")?,
                Command::Idea(idea) => self.handle_idea(&idea).await?,
            }
        }

        writeln!(self.out, "{GOODBYE}")?;
        info!("Chat session finished.");
        Ok(())
    }

    pub fn into_output(self) -> W {
        self.out
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        self.lines.next_line().await.context("Failed to read input")
    }

    async fn handle_idea(&mut self, idea: &str) -> Result<()> {
        writeln!(self.out, "\nGenerating post... this may take a moment.")?;

        match self.client.generate(idea).await {
            Ok(post) => {
                writeln!(self.out, "\nPost generated!\n")?;
                write!(self.out, "{post}")?;
                self.offer_save(&post).await?;
            }
            Err(err) => {
                warn!(error = %err, "generation failed");
                write_failure(&mut self.out, &err)?;
            }
        }
        Ok(())
    }

    async fn offer_save(&mut self, post: &GeneratedPost) -> Result<()> {
        write!(self.out, "\nSave this post to a file? (y/n): ")?;
        self.out.flush()?;
        let Some(answer) = self.next_line().await? else {
            return Ok(());
        };
        if !is_yes(&answer) {
            return Ok(());
        }

        write!(self.out, "File name (without extension): ")?;
        self.out.flush()?;
        let name = self.next_line().await?.unwrap_or_default();

        match save_post(post, &self.save_dir, &name) {
            Ok(path) => writeln!(self.out, "Post saved to {}", path.display())?,
            Err(e) => writeln!(self.out, "Could not save the file: {e:#}")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_post() -> GeneratedPost {
        GeneratedPost::new(
            "Lessons from three years of remote teams",
            "Clear written goals, generous trust and steady rituals kept our remote team aligned.",
            ["remote", "leadership", "teams"],
            "leadership",
        )
        .unwrap()
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("  EXIT "), Command::Exit);
        assert_eq!(parse_command("salir"), Command::Exit);
        assert_eq!(parse_command("Ayuda"), Command::Help);
        assert_eq!(parse_command("ejemplos"), Command::Examples);
        assert_eq!(parse_command("   "), Command::Empty);
        assert_eq!(
            parse_command(" Tips for remote leadership "),
            Command::Idea("Tips for remote leadership".to_string())
        );
    }

    #[test]
    fn test_is_yes() {
        for answer in ["y", "YES", " s ", "si", "Sí"] {
            assert!(is_yes(answer), "{answer:?}");
        }
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(""), "social_post.txt");
        assert_eq!(file_name("  "), "social_post.txt");
        assert_eq!(file_name("launch"), "launch.txt");
        assert_eq!(file_name("launch.txt"), "launch.txt");
        assert_eq!(file_name("post.TXT"), "post.TXT");
        assert_eq!(file_name("  Notes.Txt "), "Notes.Txt");
        assert_eq!(file_name("report.md"), "report.md.txt");
    }

    #[test]
    fn test_save_post_writes_rendered_text() {
        let dir = TempDir::new().unwrap();
        let post = sample_post();

        let path = save_post(&post, dir.path(), "").unwrap();

        assert_eq!(path, dir.path().join("social_post.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), post.render());
    }

    #[test]
    fn test_save_post_reports_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = save_post(&sample_post(), &missing, "post").unwrap_err();
        assert!(err.to_string().contains("Failed to write post"));
    }

    #[test]
    fn test_write_failure_includes_hint() {
        let mut out = Vec::new();
        let err = GenerationError::RateLimited("slow down".into());
        write_failure(&mut out, &err).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("rate limit reached: slow down"));
        assert!(text.contains("Hint: Wait a few moments"));
    }

    #[tokio::test]
    async fn test_session_commands_without_generation() {
        let client = GenerationClient::configure(Some("sk-test"), "gpt-4o").unwrap();
        let input = "help\n\nexamples\nquit\nnever read\n";
        let mut session = ChatSession::new(&client, input.as_bytes(), Vec::new(), ".");

        session.run().await.unwrap();

        let output = String::from_utf8(session.into_output()).unwrap();
        assert!(output.contains("USAGE"));
        assert!(output.contains("The idea can't be empty"));
        assert!(output.contains("SAMPLE IDEAS"));
        assert!(output.contains("See you soon!"));
    }

    #[tokio::test]
    async fn test_session_ends_on_end_of_input() {
        let client = GenerationClient::configure(Some("sk-test"), "gpt-4o").unwrap();
        let mut session = ChatSession::new(&client, &b""[..], Vec::new(), ".");
        session.run().await.unwrap();
        let output = String::from_utf8(session.into_output()).unwrap();
        assert!(output.contains("See you soon!"));
    }
}

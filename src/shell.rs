//! Line-oriented command shell
//!
//! Each input line is parsed with clap as if it were a command line without
//! a binary name, then executed against an [`App`].

use crate::app::App;
use crate::dispatcher::JobKind;
use crate::result::Counts;
use crate::TallyError;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::fmt::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "corpus-tally", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

/// Summary table a command reads from
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    File,
    Web,
}

impl From<SummaryKind> for JobKind {
    fn from(kind: SummaryKind) -> Self {
        match kind {
            SummaryKind::File => JobKind::File,
            SummaryKind::Web => JobKind::Web,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Watch a directory for corpora
    #[command(name = "ad")]
    AddDirectory { path: PathBuf },

    /// Crawl a web page and the pages it links to
    #[command(name = "aw")]
    AddWeb { url: String },

    /// Wait for a corpus to complete and print its counts
    Get {
        #[arg(value_enum)]
        kind: SummaryKind,
        corpus: String,
    },

    /// Print a corpus's counts if it already completed
    Query {
        #[arg(value_enum)]
        kind: SummaryKind,
        corpus: String,
    },

    /// Wait for every corpus of a kind and print all counts
    Summary {
        #[arg(value_enum)]
        kind: SummaryKind,
    },

    /// Clear file summaries
    #[command(name = "cfs")]
    ClearFileSummaries,

    /// Clear web summaries
    #[command(name = "cws")]
    ClearWebSummaries,

    /// Stop crawling and leave
    #[command(alias = "exit")]
    Stop,
}

/// What the shell loop does after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Print the message and read the next line
    Continue(String),
    /// Leave the loop
    Exit,
}

/// Parses one input line
///
/// Blank lines parse to `Ok(None)`. Parse failures carry clap's rendered
/// message, which includes usage for `help`.
pub fn parse_line(line: &str) -> Result<Option<Command>, clap::Error> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(None);
    }
    ShellLine::try_parse_from(words).map(|parsed| Some(parsed.command))
}

/// Runs one command against the app
///
/// `Stop` does not stop the app itself; the caller does once the loop ends.
pub async fn execute(app: &App, command: Command) -> Result<Outcome, TallyError> {
    let message = match command {
        Command::AddDirectory { path } => {
            let root = app.add_directory(&path).await?;
            format!("watching {}", root.display())
        }
        Command::AddWeb { url } => {
            if app.add_web_page(&url).await? {
                format!("crawling {}", url)
            } else {
                format!("{} is already tracked", url)
            }
        }
        Command::Get { kind, corpus } => {
            let counts = app.get_summary(kind.into(), &corpus).await?;
            format_counts(&corpus, &counts)
        }
        Command::Query { kind, corpus } => match app.query_summary(kind.into(), &corpus).await? {
            Some(counts) => format_counts(&corpus, &counts),
            None => format!("{}: not ready", corpus),
        },
        Command::Summary { kind } => {
            let summaries = app.get_summaries(kind.into()).await?;
            format_summaries(&summaries)
        }
        Command::ClearFileSummaries => {
            app.clear_summaries(JobKind::File)?;
            "file summaries cleared".to_string()
        }
        Command::ClearWebSummaries => {
            app.clear_summaries(JobKind::Web)?;
            "web summaries cleared".to_string()
        }
        Command::Stop => return Ok(Outcome::Exit),
    };
    Ok(Outcome::Continue(message))
}

/// Renders counts as `corpus: {a: 1, b: 2}`
pub fn format_counts(corpus: &str, counts: &Counts) -> String {
    let mut line = format!("{}: {{", corpus);
    for (i, (keyword, count)) in counts.iter().enumerate() {
        if i > 0 {
            line.push_str(", ");
        }
        let _ = write!(line, "{}: {}", keyword, count);
    }
    line.push('}');
    line
}

fn format_summaries(summaries: &HashMap<String, Counts>) -> String {
    if summaries.is_empty() {
        return "no summaries".to_string();
    }
    let mut corpora: Vec<&String> = summaries.keys().collect();
    corpora.sort();
    corpora
        .into_iter()
        .map(|corpus| format_counts(corpus, &summaries[corpus]))
        .collect::<Vec<_>>()
        .join("\n")
}

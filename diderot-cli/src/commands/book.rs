//! `diderot book list|create|upload`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::Tabled;

use diderot_client::DiderotApi;
use diderot_sync::{
    reconcile, BookUpload, ChapterOutcome, PollPolicy, ReconcileOptions, ReconcileReport,
    SyncError, SystemClock,
};

use crate::output;
use crate::session::ConnectionArgs;

#[derive(Subcommand, Debug)]
pub enum BookCommand {
    /// List the books of a course, or every book you can see.
    List(ListArgs),

    /// Create an empty book.
    Create(CreateArgs),

    /// Create and fill a book from a JSON manifest.
    Upload(UploadArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Course label to filter books by.
    #[arg(required_unless_present = "all")]
    pub course: Option<String>,

    /// Show every book in the courses you are a member of.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub course: String,
    /// Label of the new book.
    pub label: String,
    /// Title of the new book (defaults to the label).
    #[arg(long)]
    pub title: Option<String>,
}

/// Arguments for `diderot book upload`.
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Course that the book belongs to.
    pub course: String,

    /// JSON manifest describing the book's parts and chapters.
    pub manifest: PathBuf,

    /// Validate and print the plan without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds between checks while the service processes an upload.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub sleep_time: u64,

    /// Give up on a chapter after this many checks (default: wait forever).
    #[arg(long, value_name = "N")]
    pub max_polls: Option<u32>,
}

#[derive(Tabled)]
struct BookRow {
    #[tabled(rename = "label")]
    label: String,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "booklet")]
    booklet: String,
}

pub fn run(cmd: BookCommand, connection: &ConnectionArgs) -> Result<()> {
    match cmd {
        BookCommand::List(args) => args.run(connection),
        BookCommand::Create(args) => args.run(connection),
        BookCommand::Upload(args) => args.run(connection),
    }
}

impl ListArgs {
    pub fn run(self, connection: &ConnectionArgs) -> Result<()> {
        let transport = connection.connect()?;
        let books = DiderotApi::new(&transport)
            .list_books(self.course.as_deref(), self.all)
            .context("failed to list books")?;
        let rows = books
            .into_iter()
            .map(|b| BookRow {
                label: b.label,
                title: output::or_dash(b.title),
                booklet: if b.is_booklet { "yes" } else { "no" }.to_string(),
            })
            .collect();
        output::table(rows, "No books found.");
        Ok(())
    }
}

impl CreateArgs {
    pub fn run(self, connection: &ConnectionArgs) -> Result<()> {
        let title = self.title.as_deref().unwrap_or(&self.label);
        let transport = connection.connect()?;
        DiderotApi::new(&transport)
            .create_book(&self.course, title, &self.label)
            .with_context(|| format!("failed to create book {}", self.label))?;
        output::success(format!("created book {} in {}", self.label, self.course));
        Ok(())
    }
}

impl UploadArgs {
    pub fn run(self, connection: &ConnectionArgs) -> Result<()> {
        // The manifest is fully checked before credentials are requested.
        let upload = BookUpload::load(&self.manifest).map_err(upload_error)?;

        let options = ReconcileOptions {
            dry_run: self.dry_run,
            poll: PollPolicy {
                interval: Duration::from_secs(self.sleep_time),
                max_polls: self.max_polls,
            },
        };
        let transport = connection.connect()?;
        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        let report = reconcile(
            &transport,
            &SystemClock,
            &self.course,
            &upload,
            options,
            &mut |outcome: &ChapterOutcome| print_chapter(prefix, outcome, self.dry_run),
        )
        .map_err(upload_error)?;

        print_summary(prefix, &report);
        Ok(())
    }
}

fn upload_error(err: SyncError) -> anyhow::Error {
    let category = err.category();
    anyhow::Error::new(err).context(format!("book upload failed ({category})"))
}

fn print_chapter(prefix: &str, outcome: &ChapterOutcome, dry_run: bool) {
    println!("{prefix}{} {}", "✓".green().bold(), outcome.message(dry_run));
    for warning in &outcome.warnings {
        output::warning(warning);
    }
}

fn print_summary(prefix: &str, report: &ReconcileReport) {
    let book = if report.book_created {
        if report.dry_run {
            format!("would create book {}", report.book)
        } else {
            format!("created book {}", report.book)
        }
    } else {
        format!("book {}", report.book)
    };
    let parts = report.parts_created.len();
    let warned = report.chapters.iter().filter(|c| !c.warnings.is_empty()).count();
    let verb = if report.dry_run { "to create" } else { "created" };
    println!(
        "{prefix}{} '{}' {book}: {parts} parts {verb}, {} chapters, {} uploads{}",
        "✓".green().bold(),
        report.course,
        report.chapters.len(),
        report.uploads(),
        if warned > 0 {
            format!(", {warned} with warnings").yellow().to_string()
        } else {
            String::new()
        }
    );
}

//! `diderot chapter list|create|upload|publish|retract|schedule`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::Tabled;

use diderot_client::{ChapterKey, DiderotApi, NewChapter};
use diderot_core::{Rank, Schedule};
use diderot_sync::{
    attachments, upload_chapter, ChapterUpload, ContentPayload, ContentSources, PollPolicy,
    SystemClock,
};

use crate::output;
use crate::session::ConnectionArgs;

#[derive(Subcommand, Debug)]
pub enum ChapterCommand {
    /// List the chapters of a book.
    List {
        course: String,
        book: String,
    },

    /// Create a chapter.
    Create(CreateArgs),

    /// Upload content to an existing chapter.
    Upload(UploadArgs),

    /// Make a chapter visible to students.
    Publish(SelectArgs),

    /// Hide a published chapter.
    Retract(SelectArgs),

    /// Set the date or course week a chapter is published on.
    Schedule(ScheduleArgs),
}

/// Identifies one chapter of a book. The number wins over the label.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ChapterSelector {
    /// Number of the chapter.
    #[arg(long = "chapter-number")]
    pub number: Option<u32>,
    /// Label of the chapter.
    #[arg(long = "chapter-label")]
    pub label: Option<String>,
}

impl ChapterSelector {
    fn key(&self) -> Result<ChapterKey> {
        Ok(ChapterKey::from_args(self.number.map(Rank), self.label.clone())?)
    }
}

#[derive(Args, Debug)]
pub struct ScheduleFlags {
    /// Release date: YYYY-MM-DD or an ISO 8601 timestamp.
    #[arg(long)]
    pub publish_date: Option<String>,
    /// Course week to release the chapter on.
    #[arg(long)]
    pub publish_week: Option<String>,
}

impl ScheduleFlags {
    fn schedule(&self) -> Result<Schedule> {
        Ok(Schedule::new(
            self.publish_date.clone(),
            self.publish_week.clone(),
        )?)
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub course: String,
    pub book: String,
    /// Number of the new chapter.
    #[arg(long)]
    pub number: u32,
    /// Part to create the chapter in; required unless the book is a booklet.
    #[arg(long)]
    pub part: Option<u32>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub label: Option<String>,
    #[command(flatten)]
    pub schedule: ScheduleFlags,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    pub course: String,
    pub book: String,
    #[command(flatten)]
    pub chapter: ChapterSelector,
    /// PDF content.
    #[arg(long, conflicts_with_all = ["slides", "xml"])]
    pub pdf: Option<PathBuf>,
    /// PDF slides.
    #[arg(long, conflicts_with = "xml")]
    pub slides: Option<PathBuf>,
    /// XML or MLX document.
    #[arg(long)]
    pub xml: Option<PathBuf>,
    /// Printable PDF of the XML document.
    #[arg(long, requires = "xml")]
    pub xml_pdf: Option<PathBuf>,
    /// Files, directories or glob patterns to attach to XML content.
    #[arg(long = "attach", value_name = "PATH", requires = "xml")]
    pub attachments: Vec<String>,
    /// URL of a video to embed with PDF or slides content.
    #[arg(long)]
    pub video_url: Option<String>,
    /// Seconds between checks while the service processes the upload.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub sleep_time: u64,
    /// Give up after this many checks (default: wait forever).
    #[arg(long, value_name = "N")]
    pub max_polls: Option<u32>,
}

#[derive(Args, Debug)]
pub struct SelectArgs {
    pub course: String,
    pub book: String,
    #[command(flatten)]
    pub chapter: ChapterSelector,
}

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    pub course: String,
    pub book: String,
    #[command(flatten)]
    pub chapter: ChapterSelector,
    #[command(flatten)]
    pub schedule: ScheduleFlags,
}

#[derive(Tabled)]
struct ChapterRow {
    #[tabled(rename = "number")]
    number: Rank,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "label")]
    label: String,
}

pub fn run(cmd: ChapterCommand, connection: &ConnectionArgs) -> Result<()> {
    match cmd {
        ChapterCommand::List { course, book } => list(&course, &book, connection),
        ChapterCommand::Create(args) => args.run(connection),
        ChapterCommand::Upload(args) => args.run(connection),
        ChapterCommand::Publish(args) => args.set_released(connection, true),
        ChapterCommand::Retract(args) => args.set_released(connection, false),
        ChapterCommand::Schedule(args) => args.run(connection),
    }
}

fn list(course: &str, book: &str, connection: &ConnectionArgs) -> Result<()> {
    let transport = connection.connect()?;
    let mut chapters = DiderotApi::new(&transport)
        .list_chapters(course, book)
        .with_context(|| format!("failed to list chapters of {book}"))?;
    chapters.sort_by_key(|c| c.rank);
    let rows = chapters
        .into_iter()
        .map(|c| ChapterRow {
            number: c.rank,
            title: output::or_dash(c.title),
            label: output::or_dash(c.label),
        })
        .collect();
    output::table(rows, "No chapters found.");
    Ok(())
}

impl CreateArgs {
    pub fn run(self, connection: &ConnectionArgs) -> Result<()> {
        let chapter = NewChapter {
            rank: Rank(self.number),
            title: self.title,
            label: self.label,
            schedule: self.schedule.schedule()?,
        };
        let transport = connection.connect()?;
        DiderotApi::new(&transport)
            .create_chapter(&self.course, &self.book, self.part.map(Rank), &chapter)
            .with_context(|| format!("failed to create chapter {} in {}", chapter.rank, self.book))?;
        output::success(format!("created chapter {} in {}", chapter.rank, self.book));
        Ok(())
    }
}

impl UploadArgs {
    pub fn run(self, connection: &ConnectionArgs) -> Result<()> {
        let key = self.chapter.key()?;
        let resolved = attachments::resolve(&self.attachments, Path::new("."));
        let sources = ContentSources {
            pdf: self.pdf,
            slides: self.slides,
            xml: self.xml,
            xml_pdf: self.xml_pdf,
            attachments: resolved.files,
            video_url: self.video_url,
        };
        let payload = ContentPayload::from_sources(sources)?
            .context("nothing to upload: pass --pdf, --slides or --xml")?;
        let upload = ChapterUpload { payload };
        let policy = PollPolicy {
            interval: Duration::from_secs(self.sleep_time),
            max_polls: self.max_polls,
        };

        let transport = connection.connect()?;
        let report = upload_chapter(
            &transport,
            &SystemClock,
            policy,
            &self.course,
            &self.book,
            &key,
            upload,
        )
        .with_context(|| format!("upload to chapter {key} failed"))?;

        output::success(format!("uploaded chapter {key} of {}", self.book));
        for warning in &report.warnings {
            output::warning(warning);
        }
        Ok(())
    }
}

impl SelectArgs {
    fn set_released(self, connection: &ConnectionArgs, released: bool) -> Result<()> {
        let key = self.chapter.key()?;
        let transport = connection.connect()?;
        DiderotApi::new(&transport)
            .set_released(&self.course, &self.book, &key, released)
            .with_context(|| format!("failed to update chapter {key}"))?;
        let verb = if released { "published" } else { "retracted" };
        output::success(format!("{verb} chapter {key} of {}", self.book));
        Ok(())
    }
}

impl ScheduleArgs {
    pub fn run(self, connection: &ConnectionArgs) -> Result<()> {
        let key = self.chapter.key()?;
        let schedule = self.schedule.schedule()?;
        let transport = connection.connect()?;
        DiderotApi::new(&transport)
            .set_publish_date(&self.course, &self.book, &key, &schedule)
            .with_context(|| format!("failed to schedule chapter {key}"))?;
        output::success(format!("scheduled chapter {key} of {}", self.book));
        Ok(())
    }
}

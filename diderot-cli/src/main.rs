//! Diderot: course content command line client.
//!
//! # Usage
//!
//! ```text
//! diderot course list
//! diderot assignment list|submit|download|update <course> ...
//! diderot book list [<course>] [--all]
//! diderot book create <course> <label> [--title ...]
//! diderot book upload <course> <manifest.json> [--dry-run] [--sleep-time N] [--max-polls N]
//! diderot part list|create <course> <book> ...
//! diderot chapter list|create|upload|publish|retract|schedule <course> <book> ...
//! ```
//!
//! Connection flags (`--url`, `--credentials`, `--username`, `--password`,
//! `--debug`) are accepted by every subcommand.

mod commands;
mod output;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use commands::{
    assignment::AssignmentCommand, book::BookCommand, chapter::ChapterCommand,
    course::CourseCommand, part::PartCommand,
};
use session::ConnectionArgs;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "diderot",
    version,
    about = "Manage Diderot courses, assignments and books from the command line",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the courses you are a member of.
    Course {
        #[command(subcommand)]
        command: CourseCommand,
    },

    /// List, submit, download and update assignments.
    Assignment {
        #[command(subcommand)]
        command: AssignmentCommand,
    },

    /// List, create and bulk-upload books.
    Book {
        #[command(subcommand)]
        command: BookCommand,
    },

    /// List and create parts of a book.
    Part {
        #[command(subcommand)]
        command: PartCommand,
    },

    /// Manage chapters: create, upload content, publish and schedule.
    Chapter {
        #[command(subcommand)]
        command: ChapterCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.connection.debug);

    let connection = &cli.connection;
    match cli.command {
        Commands::Course { command } => commands::course::run(command, connection),
        Commands::Assignment { command } => commands::assignment::run(command, connection),
        Commands::Book { command } => commands::book::run(command, connection),
        Commands::Part { command } => commands::part::run(command, connection),
        Commands::Chapter { command } => commands::chapter::run(command, connection),
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--debug`.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

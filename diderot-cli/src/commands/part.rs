//! `diderot part list|create`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::Tabled;

use diderot_client::{DiderotApi, NewPart};
use diderot_core::Rank;

use crate::output;
use crate::session::ConnectionArgs;

#[derive(Subcommand, Debug)]
pub enum PartCommand {
    /// List the parts of a book.
    List {
        course: String,
        book: String,
    },

    /// Create a part in a book.
    Create(CreateArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub course: String,
    pub book: String,
    /// Title of the new part.
    pub title: String,
    /// Number of the new part.
    pub number: u32,
    /// Label of the new part (assigned by the service when omitted).
    #[arg(long)]
    pub label: Option<String>,
}

#[derive(Tabled)]
struct PartRow {
    #[tabled(rename = "number")]
    number: Rank,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "label")]
    label: String,
}

pub fn run(cmd: PartCommand, connection: &ConnectionArgs) -> Result<()> {
    match cmd {
        PartCommand::List { course, book } => {
            let transport = connection.connect()?;
            let mut parts = DiderotApi::new(&transport)
                .list_parts(&course, &book)
                .with_context(|| format!("failed to list parts of {book}"))?;
            parts.sort_by_key(|p| p.rank);
            let rows = parts
                .into_iter()
                .map(|p| PartRow {
                    number: p.rank,
                    title: output::or_dash(p.title),
                    label: output::or_dash(p.label),
                })
                .collect();
            output::table(rows, "No parts found.");
            Ok(())
        }
        PartCommand::Create(args) => args.run(connection),
    }
}

impl CreateArgs {
    pub fn run(self, connection: &ConnectionArgs) -> Result<()> {
        let part = NewPart {
            rank: Rank(self.number),
            title: self.title,
            label: self.label,
        };
        let transport = connection.connect()?;
        DiderotApi::new(&transport)
            .create_part(&self.course, &self.book, &part)
            .with_context(|| format!("failed to create part {} in {}", part.rank, self.book))?;
        output::success(format!("created part {} ({}) in {}", part.rank, part.title, self.book));
        Ok(())
    }
}

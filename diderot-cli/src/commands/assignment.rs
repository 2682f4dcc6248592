//! `diderot assignment list|submit|download|update`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::Tabled;

use diderot_client::{AssignmentFiles, DiderotApi, DownloadOutcome};

use crate::output;
use crate::session::ConnectionArgs;

#[derive(Subcommand, Debug)]
pub enum AssignmentCommand {
    /// List the assignments of a course.
    List {
        /// Course label.
        course: String,
    },

    /// Submit a handin file to an assignment.
    Submit(SubmitArgs),

    /// Download the handout files of an assignment.
    Download(DownloadArgs),

    /// Replace autograder files or the handout of an assignment.
    Update(UpdateArgs),
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    pub course: String,
    pub homework: String,
    /// Path to the handin file.
    pub handin_path: PathBuf,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    pub course: String,
    pub homework: String,
    /// Directory to save files into. Existing files are never overwritten.
    #[arg(long, short = 'd', default_value = ".")]
    pub directory: PathBuf,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub course: String,
    pub homework: String,
    /// Autograder tar for the assignment.
    #[arg(long)]
    pub autograder_tar: Option<PathBuf>,
    /// Autograder Makefile for the assignment.
    #[arg(long)]
    pub autograder_makefile: Option<PathBuf>,
    /// Student handout for the assignment.
    #[arg(long)]
    pub handout: Option<PathBuf>,
}

#[derive(Tabled)]
struct AssignmentRow {
    #[tabled(rename = "name")]
    name: String,
}

pub fn run(cmd: AssignmentCommand, connection: &ConnectionArgs) -> Result<()> {
    match cmd {
        AssignmentCommand::List { course } => list(&course, connection),
        AssignmentCommand::Submit(args) => args.run(connection),
        AssignmentCommand::Download(args) => args.run(connection),
        AssignmentCommand::Update(args) => args.run(connection),
    }
}

fn list(course: &str, connection: &ConnectionArgs) -> Result<()> {
    let transport = connection.connect()?;
    let labs = DiderotApi::new(&transport)
        .list_assignments(course)
        .with_context(|| format!("failed to list assignments of {course}"))?;
    let rows = labs
        .into_iter()
        .map(|lab| AssignmentRow { name: lab.name })
        .collect();
    output::table(rows, "No assignments found.");
    Ok(())
}

impl SubmitArgs {
    pub fn run(self, connection: &ConnectionArgs) -> Result<()> {
        let transport = connection.connect()?;
        DiderotApi::new(&transport)
            .submit_assignment(&self.course, &self.homework, &self.handin_path)
            .with_context(|| format!("submission to {} failed", self.homework))?;
        output::success(format!(
            "submitted {} to {} ({})",
            self.handin_path.display(),
            self.homework,
            self.course
        ));
        Ok(())
    }
}

impl DownloadArgs {
    pub fn run(self, connection: &ConnectionArgs) -> Result<()> {
        let transport = connection.connect()?;
        let outcomes = DiderotApi::new(&transport)
            .download_assignment(&self.course, &self.homework, &self.directory)
            .with_context(|| format!("failed to download {}", self.homework))?;
        if outcomes.is_empty() {
            println!("No files attached to {}.", self.homework);
        }
        for outcome in outcomes {
            match outcome {
                DownloadOutcome::Saved(path) => {
                    output::success(format!("downloaded {}", path.display()))
                }
                DownloadOutcome::Exists(path) => output::warning(format!(
                    "{} already exists; not overwritten",
                    path.display()
                )),
                DownloadOutcome::Missing { kind } => println!("  no {kind}"),
            }
        }
        Ok(())
    }
}

impl UpdateArgs {
    pub fn run(self, connection: &ConnectionArgs) -> Result<()> {
        let files = AssignmentFiles {
            autograder_tar: self.autograder_tar,
            autograder_makefile: self.autograder_makefile,
            handout: self.handout,
        };
        let transport = connection.connect()?;
        let updated = DiderotApi::new(&transport)
            .update_assignment(&self.course, &self.homework, &files)
            .with_context(|| format!("failed to update {}", self.homework))?;
        if updated {
            output::success(format!("updated {} ({})", self.homework, self.course));
        } else {
            println!("Nothing to update: pass --autograder-tar, --autograder-makefile or --handout.");
        }
        Ok(())
    }
}

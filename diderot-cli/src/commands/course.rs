//! `diderot course list`

use anyhow::{Context, Result};
use clap::Subcommand;
use tabled::Tabled;

use diderot_client::DiderotApi;

use crate::output;
use crate::session::ConnectionArgs;

#[derive(Subcommand, Debug)]
pub enum CourseCommand {
    /// List the courses you are a member of.
    List,
}

#[derive(Tabled)]
struct CourseRow {
    #[tabled(rename = "label")]
    label: String,
    #[tabled(rename = "number")]
    number: String,
}

pub fn run(cmd: CourseCommand, connection: &ConnectionArgs) -> Result<()> {
    match cmd {
        CourseCommand::List => {
            let transport = connection.connect()?;
            let courses = DiderotApi::new(&transport)
                .list_courses()
                .context("failed to list courses")?;
            let rows = courses
                .into_iter()
                .map(|c| CourseRow {
                    label: c.label,
                    number: output::or_dash(c.number),
                })
                .collect();
            output::table(rows, "No courses found.");
            Ok(())
        }
    }
}

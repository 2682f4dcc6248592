//! Connection flags, credential resolution and login.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use dialoguer::{Input, Password};
use tracing::debug;

use diderot_client::{endpoints, HttpTransport};
use diderot_core::{credentials, Credentials};

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Base URL of the Diderot deployment.
    #[arg(
        long = "url",
        short = 'a',
        env = "DIDEROT_URL",
        default_value = endpoints::DEFAULT_URL,
        global = true
    )]
    pub url: String,

    /// Credentials file (username on the first line, password on the second).
    #[arg(long, short = 'c', value_name = "PATH", global = true)]
    pub credentials: Option<PathBuf>,

    #[arg(long, short = 'u', env = "DIDEROT_USER", global = true)]
    pub username: Option<String>,

    #[arg(long, short = 'p', env = "DIDEROT_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Log every request and response status.
    #[arg(long, env = "DEBUG", global = true)]
    pub debug: bool,
}

impl ConnectionArgs {
    /// Explicit flags first, then credential files, then an interactive prompt.
    pub fn resolve_credentials(&self) -> Result<Credentials> {
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            return Ok(Credentials {
                username: username.clone(),
                password: password.clone(),
            });
        }
        if let Some(found) = credentials::discover(self.credentials.as_deref())
            .context("failed to read credentials")?
        {
            return Ok(found);
        }

        let username = match &self.username {
            Some(username) => username.clone(),
            None => Input::new()
                .with_prompt("Username")
                .interact_text()
                .context("failed to read username")?,
        };
        let password = match &self.password {
            Some(password) => password.clone(),
            None => Password::new()
                .with_prompt("Password")
                .interact()
                .context("failed to read password")?,
        };
        Ok(Credentials { username, password })
    }

    /// Build an authenticated transport.
    pub fn connect(&self) -> Result<HttpTransport> {
        let credentials = self.resolve_credentials()?;
        debug!(url = %self.url, user = %credentials.username, "connecting");
        let mut transport = HttpTransport::new(&self.url)
            .with_context(|| format!("failed to set up a client for {}", self.url))?;
        transport
            .login(&credentials)
            .with_context(|| format!("login to {} failed", self.url))?;
        Ok(transport)
    }
}

//! `dockhand init --repository <url> [...]`

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Args;

use dockhand_core::{config, Admission, Config};

use crate::GlobalArgs;

/// Write a new configuration file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Clone URL of the repository that holds one directory per service.
    #[arg(long, short = 'r')]
    pub repository: String,

    /// Branch to follow.
    #[arg(long, short = 'b', default_value = "main")]
    pub branch: String,

    /// Folder that will contain the working copy (default: ~/.dockhand/work).
    #[arg(long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Folder with externally managed `<service>.env` files.
    #[arg(long, value_name = "DIR")]
    pub env_dir: Option<PathBuf>,

    /// Container runtime command, e.g. "docker compose".
    #[arg(long, value_name = "CMD")]
    pub compose_command: Option<String>,

    /// What a trigger does while a pass is running: queue | reject.
    #[arg(long, default_value_t = AdmissionArg(Admission::Queue))]
    pub admission: AdmissionArg,

    /// Shared secret expected in the webhook's `token` query parameter.
    #[arg(long)]
    pub token: Option<String>,

    /// Webhook listen address.
    #[arg(long, default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// Do not start the webhook listener with the daemon.
    #[arg(long)]
    pub no_http: bool,

    /// Replace an existing configuration file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = self.to_config();
        let path = match &global.config {
            Some(path) => {
                config::init_to(path, &config, self.force)
                    .with_context(|| format!("failed to write '{}'", path.display()))?;
                path.clone()
            }
            None => {
                let home = super::home()?;
                config::init_at(&home, &config, self.force)
                    .context("failed to write configuration")?
            }
        };

        println!("✓ Wrote {}", path.display());
        println!(
            "  Following '{}' on branch '{}'",
            config.repository, config.branch
        );
        if config.http.enabled && config.http.token.is_none() {
            println!("  No webhook token set: the webhook will refuse every request.");
        }
        Ok(())
    }

    fn to_config(&self) -> Config {
        let mut config = Config::new(self.repository.clone());
        config.branch = self.branch.clone();
        config.workdir = self.workdir.clone();
        config.env_dir = self.env_dir.clone();
        if let Some(command) = &self.compose_command {
            let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
            if !parts.is_empty() {
                config.compose_command = parts;
            }
        }
        config.admission = self.admission.0;
        config.http.enabled = !self.no_http;
        config.http.bind = self.bind.clone();
        config.http.token = self.token.clone();
        config
    }
}

// ---------------------------------------------------------------------------
// Admission argument — parsed from CLI strings, converts to core type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct AdmissionArg(pub Admission);

impl FromStr for AdmissionArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(Self(Admission::Queue)),
            "reject" => Ok(Self(Admission::Reject)),
            other => Err(format!(
                "unknown admission '{other}'; expected: queue, reject"
            )),
        }
    }
}

impl fmt::Display for AdmissionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Admission::Queue => f.write_str("queue"),
            Admission::Reject => f.write_str("reject"),
        }
    }
}

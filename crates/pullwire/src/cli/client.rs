use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use pullwire_fetch::{
    DEFAULT_CONNECT_TIMEOUT, FetchConfig, FetchSettings, ReqwestClient, RetryEngine,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    #[default]
    Default,
    Sec,
    SecInstaller,
    ShortUrl,
}

/// Options shared by every command that talks to a server.
#[derive(Clone, Debug, Args)]
pub struct ClientArgs {
    /// Named fetch policy to start from
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    pub preset: Preset,
    /// Contact string sent as User-Agent by the SEC presets
    #[arg(long)]
    pub contact: Option<String>,
    /// TOML settings applied on top of the preset
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl ClientArgs {
    pub fn config(&self) -> Result<FetchConfig> {
        let preset = match self.preset {
            Preset::Default => FetchConfig::default(),
            Preset::ShortUrl => FetchConfig::short_url()?,
            Preset::Sec | Preset::SecInstaller => {
                let Some(contact) = self.contact.as_deref() else {
                    bail!("--contact is required for the {:?} preset", self.preset);
                };
                if self.preset == Preset::Sec {
                    FetchConfig::sec(contact)?
                } else {
                    FetchConfig::sec_installer(contact)?
                }
            }
        };

        let Some(path) = &self.config else {
            return Ok(preset);
        };
        let settings = FetchSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        Ok(settings.apply(preset.to_builder()).build()?)
    }

    pub fn engine(&self, log_redirects: bool) -> Result<Arc<RetryEngine<ReqwestClient>>> {
        let config = self.config()?;
        let client = ReqwestClient::builder()
            .log_redirects(log_redirects)
            .connect_timeout(connect_timeout(config.request_timeout()))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Arc::new(RetryEngine::new(client, config)))
    }
}

/// Dialing must time out before the request as a whole does.
fn connect_timeout(request_timeout: Duration) -> Duration {
    DEFAULT_CONNECT_TIMEOUT.min(request_timeout / 2)
}

use anyhow::{Context, Result};
use clap::Args;
use pullwire_fetch::RedirectChaser;
use tokio_util::sync::CancellationToken;

use super::client::ClientArgs;

#[derive(Clone, Debug, Args)]
pub struct ResolveArg {
    pub url: String,
    #[command(flatten)]
    pub client: ClientArgs,
}

impl ResolveArg {
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let chaser = RedirectChaser::new(self.client.engine(true)?);
        let resolved = chaser
            .resolve(&cancel, &self.url)
            .await
            .with_context(|| format!("failed to resolve {}", self.url))?;

        println!("{}", resolved.final_url);
        println!("{} bytes", resolved.body.len());
        Ok(())
    }
}

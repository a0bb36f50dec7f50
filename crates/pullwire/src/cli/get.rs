use anyhow::{Context, Result};
use clap::Args;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::client::ClientArgs;

#[derive(Clone, Debug, Args)]
pub struct GetArg {
    pub url: String,
    /// Print the body as received, without decompression or charset handling
    #[arg(long)]
    pub raw: bool,
    #[command(flatten)]
    pub client: ClientArgs,
}

impl GetArg {
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let engine = self.client.engine(false)?;
        let body = if self.raw {
            engine.get_raw(&cancel, &self.url).await
        } else {
            engine.get_bytes(&cancel, &self.url).await
        }
        .with_context(|| format!("failed to fetch {}", self.url))?;

        let mut stdout = tokio::io::stdout();
        stdout.write_all(&body).await?;
        stdout.flush().await?;
        Ok(())
    }
}

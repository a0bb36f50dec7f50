use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use pullwire_fetch::{StreamCompletion, StreamFetcher};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::client::ClientArgs;

#[derive(Clone, Debug, Args)]
pub struct StreamArg {
    pub url: String,
    /// Pause between polls, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_ms: u64,
    #[command(flatten)]
    pub client: ClientArgs,
}

impl StreamArg {
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let engine = self.client.engine(false)?;
        let mut handle = StreamFetcher::new(engine, self.url.as_str())
            .poll_interval(Duration::from_millis(self.poll_ms))
            .spawn(cancel);

        while let Some(line) = handle.next_line().await {
            println!("{line}");
        }

        let report = handle.finish().await?;
        info!(
            offset = report.cursor.offset,
            started = report.cursor.start.is_some(),
            ended = report.cursor.end.is_some(),
            "stream closed"
        );
        match report.completion {
            StreamCompletion::Failed(e) => bail!("stream {} failed: {e}", self.url),
            StreamCompletion::Canceled => bail!("stream {} canceled", self.url),
            _ => Ok(()),
        }
    }
}

use anyhow::{Result, bail};
use clap::Args;
use pullwire_fetch::{NetworkProbe, ReqwestClient};
use tokio_util::sync::CancellationToken;

use super::client::ClientArgs;

#[derive(Clone, Debug, Args)]
pub struct ProbeArg {
    #[command(flatten)]
    pub client: ClientArgs,
}

impl ProbeArg {
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let config = self.client.config()?;
        let probe = NetworkProbe::new(config.probe());
        let client = ReqwestClient::new()?;

        let down = tokio::select! {
            biased;
            _ = cancel.cancelled() => bail!("probe canceled"),
            down = probe.is_globally_unavailable(&client) => down,
        };
        if down {
            bail!("none of {} endpoints answered", probe.endpoints().len());
        }
        println!("network reachable");
        Ok(())
    }
}

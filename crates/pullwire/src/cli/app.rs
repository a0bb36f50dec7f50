use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use super::get::GetArg;
use super::probe::ProbeArg;
use super::resolve::ResolveArg;
use super::stream::StreamArg;

#[derive(Clone, Debug, Parser)]
#[command(name = "pullwire", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "g", name = "get", about = "Fetch a URL with retries and print the body")]
    Get(GetArg),
    #[command(alias = "r", name = "resolve", about = "Follow redirects and print the final URL")]
    Resolve(ResolveArg),
    #[command(alias = "s", name = "stream", about = "Follow a growing JSONL document until it ends")]
    Stream(StreamArg),
    #[command(alias = "p", name = "probe", about = "Check whether the internet is reachable")]
    Probe(ProbeArg),
}

impl Commands {
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        match self {
            Commands::Get(arg) => arg.run(cancel).await,
            Commands::Resolve(arg) => arg.run(cancel).await,
            Commands::Stream(arg) => arg.run(cancel).await,
            Commands::Probe(arg) => arg.run(cancel).await,
        }
    }
}

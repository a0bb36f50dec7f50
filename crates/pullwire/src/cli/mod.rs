pub mod app;
mod client;
mod get;
mod probe;
mod resolve;
mod stream;

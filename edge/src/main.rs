mod client;
mod controller;
mod hardware;
mod host;
mod snapshot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}

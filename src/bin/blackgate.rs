//! Server entry point.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    blackgate::server::run().await
}

mod host;
mod remote;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}

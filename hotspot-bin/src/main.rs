use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    hotspot_bin::run().await
}

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    searchload::cli::run().await
}

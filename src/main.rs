use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tourguide_cli::cli::app::run().await
}

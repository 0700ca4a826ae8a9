#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = papercheck::run().await {
        eprintln!("papercheck fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

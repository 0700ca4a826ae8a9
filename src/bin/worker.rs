#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = papercheck::run_worker().await {
        eprintln!("papercheck-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_runtime::run().await {
        eprintln!("exam-runtime fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

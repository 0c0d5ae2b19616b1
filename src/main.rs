#[tokio::main]
async fn main() -> anyhow::Result<()> {
    workflowy_flow::run().await
}

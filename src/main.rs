#[tokio::main]
async fn main() -> anyhow::Result<()> {
    workflow_merge::run_server().await
}

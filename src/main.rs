use rask_telemetry_client::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::main().await
}

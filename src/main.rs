#[tokio::main]
async fn main() -> anyhow::Result<()> {
    z1_tracker_lib::run().await
}

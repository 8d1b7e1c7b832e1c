#[tokio::main]
async fn main() -> anyhow::Result<()> {
    photobooth_lib::run().await
}

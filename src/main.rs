#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatwalk::run().await
}

mod driver;
mod host;
mod loops;
mod reconciler;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}

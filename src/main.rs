#[tokio::main]
async fn main() {
    smart_bookmark::run().await;
}

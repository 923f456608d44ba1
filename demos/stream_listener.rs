//! Listen to a user's notification stream and surface records natively.
//!
//! ```sh
//! DEEPFLOW_BACKEND_URL=http://localhost:8000 cargo run --example stream_listener -- user-123
//! ```

use deepflow_notify::NotificationPipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deepflow_notify=debug".into()),
        )
        .init();

    let user_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demo-user".to_string());
    let backend_base = std::env::var("DEEPFLOW_BACKEND_URL")
        .unwrap_or_else(|_| "http://localhost:8000".to_string());

    let pipeline = NotificationPipeline::builder()
        .user_id(user_id.clone())
        .backend_base(backend_base)
        .on_record(|record| {
            println!("[{}] {}: {}", record.urgency, record.title, record.body);
        })
        .on_activate(|url| {
            println!("notification clicked, navigate to {url:?}");
        })
        .build()
        .await?;

    if !pipeline.permission().request().await {
        eprintln!("notifications not permitted on this host, printing records only");
    }
    if !pipeline.enable() {
        anyhow::bail!("could not start the notification stream for {user_id}");
    }

    println!("listening for notifications addressed to {user_id}, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    pipeline.disable();
    Ok(())
}

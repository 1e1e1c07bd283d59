//! # StackIt Realtime Node
//!
//! Demo host for the realtime stack. Brings up a [`RealtimeContext`]
//! over the simulated transport, attaches the kind of consumers a UI
//! would (a question feed, a live vote counter), and logs what they
//! see until Ctrl+C.

use anyhow::Result;
use stackit_bus::{EventKind, EventPayload, ItemKind};
use stackit_runtime::{RealtimeContext, RuntimeConfig};
use tokio_stream::StreamExt;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let config = RuntimeConfig::from_env();
    let context = RealtimeContext::new(config);

    // A feed widget: prints every new question as it arrives.
    let mut feed = context.event_stream(EventKind::NewQuestion);
    tokio::spawn(async move {
        while let Some(event) = feed.next().await {
            if let EventPayload::NewQuestion {
                title, author_name, ..
            } = &event.payload
            {
                info!(author = %author_name, title = %title, "question feed");
            }
        }
    });

    // A question page watching its own score.
    let votes = context.live_votes("q42", 0);

    if let Err(error) = context.start().await {
        warn!(error = %error, "starting offline; realtime features degraded");
    }

    // An optimistic local vote fans out even while offline.
    context.cast_vote("u-demo", "q42", ItemKind::Question, votes.value() + 1)?;
    info!(
        votes = votes.value(),
        online = context.online_count(),
        state = %context.connection_state(),
        "demo state after start",
    );

    info!("Realtime node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    context.shutdown();
    Ok(())
}

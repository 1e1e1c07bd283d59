//! # Simulated Transport
//!
//! A local stand-in for a real network client, reproducing the mock
//! feed the application shipped with: after an artificial handshake
//! delay it reports an initial audience, then pushes presence updates
//! and random domain events until the link closes. Everything here
//! lives behind the [`Transport`] seam, so swapping in a real client
//! touches nothing else.

use crate::config::SimulationConfig;
use crate::transport::{Transport, TransportError, TransportLink};
use crate::INBOUND_CHANNEL_CAPACITY;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stackit_bus::{EventPayload, ItemKind};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant};
use tracing::debug;

const AUTHORS: &[&str] = &[
    "dev_sarah",
    "marcus_j",
    "priya_codes",
    "tom_builder",
    "lin_a11y",
];

const QUESTION_TITLES: &[&str] = &[
    "How does JWT authentication actually work?",
    "Why is my query slow after adding an index?",
    "What is the difference between move and borrow here?",
    "How do I cancel an in-flight request cleanly?",
    "When should I reach for a message queue?",
];

const TAGS: &[&str] = &["rust", "async", "database", "auth", "performance", "testing"];

const EXCERPTS: &[&str] = &[
    "thought you might know this one",
    "adding to what you said earlier",
    "this contradicts your accepted answer",
];

const SYSTEM_NOTES: &[&str] = &[
    "Scheduled maintenance tonight at 02:00 UTC.",
    "New markdown editor rolled out to everyone.",
    "Search indexing is catching up; results may lag.",
];

/// Transport implementation backed by timers and a seeded RNG.
pub struct SimulatedTransport {
    config: SimulationConfig,
}

impl SimulatedTransport {
    /// Create a simulated transport with the given tunables.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// The configuration this transport was built with.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn connect(&self) -> Result<TransportLink, TransportError> {
        tokio::time::sleep(self.config.handshake_delay).await;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let initial_online = rng.gen_range(self.config.initial_online.clone());

        let (feed_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let (closer_tx, closer_rx) = watch::channel(false);

        tokio::spawn(run_feed(
            self.config.clone(),
            rng,
            initial_online,
            feed_tx,
            closer_rx,
        ));

        debug!(online = initial_online, "simulated handshake complete");
        Ok(TransportLink::new(initial_online, inbound_rx, closer_tx))
    }
}

/// Background task pushing presence and activity onto one link's feed.
///
/// Ends when the closer turns true, the closer channel closes, or the
/// inbound receiver is dropped.
async fn run_feed(
    config: SimulationConfig,
    mut rng: StdRng,
    mut online: u32,
    feed: mpsc::Sender<EventPayload>,
    mut closed: watch::Receiver<bool>,
) {
    let start = Instant::now();
    let mut presence = interval_at(start + config.presence_interval, config.presence_interval);
    let mut activity = interval_at(start + config.activity_interval, config.activity_interval);

    loop {
        tokio::select! {
            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    break;
                }
            }
            _ = presence.tick() => {
                online = walk_online(online, &mut rng, &config);
                if feed.send(EventPayload::UserOnlineCount { count: online }).await.is_err() {
                    break;
                }
            }
            _ = activity.tick() => {
                if feed.send(random_activity(&mut rng)).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!("simulated feed stopped");
}

/// One random step of the presence walk, clamped to the online band.
fn walk_online(current: u32, rng: &mut StdRng, config: &SimulationConfig) -> u32 {
    let step = i64::from(config.presence_step);
    let delta = rng.gen_range(-step..=step);
    let next = i64::from(current) + delta;
    next.clamp(
        i64::from(config.online_floor),
        i64::from(config.online_ceiling),
    ) as u32
}

/// One randomly chosen domain event, weighted toward vote updates.
fn random_activity(rng: &mut StdRng) -> EventPayload {
    let question_id = format!("q{}", rng.gen_range(1..=500));
    match rng.gen_range(0..6) {
        0 | 1 => {
            let (item_id, item_kind) = if rng.gen_bool(0.5) {
                (question_id, ItemKind::Question)
            } else {
                (format!("a{}", rng.gen_range(1..=900)), ItemKind::Answer)
            };
            EventPayload::VoteUpdate {
                item_id,
                item_kind,
                new_vote_count: rng.gen_range(-5..=120),
            }
        }
        2 => EventPayload::NewAnswer {
            question_id,
            question_title: pick(rng, QUESTION_TITLES).to_string(),
            author_name: pick(rng, AUTHORS).to_string(),
        },
        3 => {
            let tag_count = rng.gen_range(1..=3);
            EventPayload::NewQuestion {
                question_id,
                title: pick(rng, QUESTION_TITLES).to_string(),
                author_name: pick(rng, AUTHORS).to_string(),
                tags: (0..tag_count)
                    .map(|_| pick(rng, TAGS).to_string())
                    .collect(),
            }
        }
        4 => EventPayload::Mention {
            item_id: question_id,
            mentioned_by: pick(rng, AUTHORS).to_string(),
            excerpt: pick(rng, EXCERPTS).to_string(),
        },
        _ => EventPayload::SystemMessage {
            body: pick(rng, SYSTEM_NOTES).to_string(),
        },
    }
}

fn pick<'a>(rng: &mut StdRng, items: &'a [&'a str]) -> &'a str {
    items[rng.gen_range(0..items.len())]
}

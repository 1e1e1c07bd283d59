//! # Live Value Flows
//!
//! Derived-state hooks fed by the real machinery: keyed vote counts
//! across several widgets, the presence band under the simulated
//! transport, and the monotonic guard under nested publishes.

#[cfg(test)]
mod tests {
    use stackit_bus::{EventBus, EventKind, EventPayload, EventPublisher, ItemKind};
    use stackit_connection::{
        ConnectionConfig, ConnectionManager, SimulatedTransport, SimulationConfig,
    };
    use stackit_runtime::{LiveOnlineCount, LiveVoteCount};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_keyed_hooks_update_independently() {
        let bus = EventBus::new();
        let a = LiveVoteCount::new(&bus, "42", 0);
        let b = LiveVoteCount::new(&bus, "42", 0);
        let c = LiveVoteCount::new(&bus, "99", 5);

        bus.publish_from(
            "u-7",
            EventPayload::VoteUpdate {
                item_id: "42".to_string(),
                item_kind: ItemKind::Question,
                new_vote_count: 7,
            },
        )
        .expect("publish");

        assert_eq!(a.value(), 7);
        assert_eq!(b.value(), 7);
        assert_eq!(c.value(), 5, "hook keyed elsewhere must not move");
    }

    #[test]
    fn test_nested_correction_cannot_be_undone_by_the_original() {
        let bus = EventBus::new();

        // A subscriber that reacts to the first vote by publishing a
        // correction. Depth-first delivery hands the correction to
        // later subscribers before the original event reaches them.
        let correcting_bus = bus.clone();
        let fired = Arc::new(AtomicBool::new(false));
        let _corrector = bus.subscribe(EventKind::VoteUpdate, move |event| {
            if let EventPayload::VoteUpdate {
                item_id, item_kind, ..
            } = &event.payload
            {
                if !fired.swap(true, Ordering::SeqCst) {
                    correcting_bus
                        .publish(EventPayload::VoteUpdate {
                            item_id: item_id.clone(),
                            item_kind: *item_kind,
                            new_vote_count: 2,
                        })
                        .expect("nested publish");
                }
            }
        });

        let votes = LiveVoteCount::new(&bus, "q1", 0);
        bus.publish(EventPayload::VoteUpdate {
            item_id: "q1".to_string(),
            item_kind: ItemKind::Question,
            new_vote_count: 1,
        })
        .expect("publish");

        // The hook saw the correction (seq 2) first, then the original
        // (seq 1); the stale original must not win.
        assert_eq!(votes.value(), 2);
    }

    #[tokio::test]
    async fn test_online_count_stays_in_band_under_simulated_feed() {
        let config = SimulationConfig {
            handshake_delay: Duration::from_millis(1),
            presence_interval: Duration::from_millis(5),
            activity_interval: Duration::from_secs(3600),
            ..SimulationConfig::default()
        };
        let bus = EventBus::new();
        let online = LiveOnlineCount::new(&bus);
        let mut updates = online.watch();
        let manager = ConnectionManager::new(
            Arc::new(SimulatedTransport::new(config.clone())),
            bus.clone(),
            ConnectionConfig::for_testing(),
        );

        manager.connect().await.expect("connect");

        // The seed plus a few presence steps, all inside the band.
        for _ in 0..5 {
            timeout(Duration::from_millis(500), updates.changed())
                .await
                .expect("timeout")
                .expect("fold alive");
            let count = *updates.borrow_and_update();
            assert!(
                count >= config.online_floor && count <= config.online_ceiling,
                "presence {count} left the band"
            );
        }

        manager.disconnect();
    }
}

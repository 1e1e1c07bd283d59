//! # Connection Lifecycle Flows
//!
//! The manager driven through a scripted transport: shared handshakes,
//! retry and exhaustion, cancellation, transport loss, and the inbound
//! pump into the bus.

#[cfg(test)]
mod tests {
    use crate::support::{wait_for_state, wait_until, ScriptedOutcome, ScriptedTransport};
    use parking_lot::Mutex;
    use stackit_bus::{EventBus, EventKind, EventPayload};
    use stackit_connection::{
        ConnectionConfig, ConnectionError, ConnectionManager, ConnectionState, TransportError,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    fn manager_over(
        script: Vec<ScriptedOutcome>,
        bus: &EventBus,
    ) -> (ConnectionManager, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let manager = ConnectionManager::new(
            Arc::clone(&transport) as Arc<dyn stackit_connection::Transport>,
            bus.clone(),
            ConnectionConfig::for_testing(),
        );
        (manager, transport)
    }

    fn online_recorder(bus: &EventBus) -> (Arc<Mutex<Vec<u32>>>, stackit_bus::SubscriptionGuard) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let guard = bus.subscribe(EventKind::UserOnlineCount, move |event| {
            if let EventPayload::UserOnlineCount { count } = &event.payload {
                recorder.lock().push(*count);
            }
        });
        (seen, guard)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_handshake() {
        let bus = EventBus::new();
        let transport = Arc::new(
            ScriptedTransport::new(vec![ScriptedOutcome::Accept { initial_online: 14 }])
                .with_handshake_delay(Duration::from_millis(20)),
        );
        let manager = ConnectionManager::new(
            Arc::clone(&transport) as Arc<dyn stackit_connection::Transport>,
            bus.clone(),
            ConnectionConfig::for_testing(),
        );
        let second = manager.clone();

        let (a, b) = tokio::join!(manager.connect(), second.connect());
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_unanswered_handshake_errors_without_presence() {
        let bus = EventBus::new();
        let (seen, _guard) = online_recorder(&bus);
        let (manager, _transport) =
            manager_over(vec![ScriptedOutcome::Hang, ScriptedOutcome::Hang], &bus);

        let result = manager.connect().await;
        match result {
            Err(ConnectionError::HandshakeFailed { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last, TransportError::TimedOut);
            }
            other => panic!("expected handshake failure, got {other:?}"),
        }
        assert_eq!(manager.state(), ConnectionState::Error);
        assert!(
            seen.lock().is_empty(),
            "a connection that never opened must publish nothing"
        );
    }

    #[tokio::test]
    async fn test_refusal_then_retry_succeeds() {
        let bus = EventBus::new();
        let (seen, _guard) = online_recorder(&bus);
        let (manager, transport) = manager_over(
            vec![
                ScriptedOutcome::Refuse,
                ScriptedOutcome::Accept { initial_online: 17 },
            ],
            &bus,
        );

        manager.connect().await.expect("retry should succeed");
        assert_eq!(transport.connect_count(), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(*seen.lock(), vec![17]);
    }

    #[tokio::test]
    async fn test_connect_after_error_dials_again() {
        let bus = EventBus::new();
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedOutcome::Refuse,
            ScriptedOutcome::Accept { initial_online: 8 },
        ]));
        let config = ConnectionConfig {
            max_retries: 0,
            ..ConnectionConfig::for_testing()
        };
        let manager = ConnectionManager::new(
            Arc::clone(&transport) as Arc<dyn stackit_connection::Transport>,
            bus.clone(),
            config,
        );

        assert!(manager.connect().await.is_err());
        assert_eq!(manager.state(), ConnectionState::Error);

        manager.connect().await.expect("second connect");
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_during_backoff_cancels() {
        let bus = EventBus::new();
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedOutcome::Refuse,
            ScriptedOutcome::Accept { initial_online: 9 },
        ]));
        // A long backoff so the disconnect lands inside it.
        let config = ConnectionConfig {
            handshake_timeout: Duration::from_millis(50),
            max_retries: 2,
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_millis(400),
        };
        let manager = ConnectionManager::new(
            Arc::clone(&transport) as Arc<dyn stackit_connection::Transport>,
            bus.clone(),
            config,
        );

        let racing = manager.clone();
        let attempt = tokio::spawn(async move { racing.connect().await });

        let probe = Arc::clone(&transport);
        wait_until("first handshake was refused", move || {
            probe.connect_count() == 1
        })
        .await;
        sleep(Duration::from_millis(20)).await;
        manager.disconnect();

        let outcome = attempt.await.expect("join");
        assert_eq!(outcome, Err(ConnectionError::Cancelled));
        assert_eq!(transport.connect_count(), 1, "no dial after cancel");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_lost_feed_goes_offline_without_redial() {
        let bus = EventBus::new();
        let (manager, transport) = manager_over(
            vec![ScriptedOutcome::Accept { initial_online: 12 }],
            &bus,
        );

        manager.connect().await.expect("connect");
        assert!(manager.is_connected());

        transport.drop_feed();
        wait_for_state(&manager, ConnectionState::Disconnected).await;
        assert!(!manager.is_connected());
        assert_eq!(transport.connect_count(), 1, "loss must not redial");
    }

    #[tokio::test]
    async fn test_inbound_payloads_reach_bus_subscribers() {
        let bus = EventBus::new();
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&bodies);
        let _guard = bus.subscribe(EventKind::SystemMessage, move |event| {
            if let EventPayload::SystemMessage { body } = &event.payload {
                recorder.lock().push((event.user_id.clone(), body.clone()));
            }
        });
        let (manager, transport) = manager_over(
            vec![ScriptedOutcome::Accept { initial_online: 30 }],
            &bus,
        );

        manager.connect().await.expect("connect");
        transport
            .push_inbound(EventPayload::SystemMessage {
                body: "search index rebuilt".to_string(),
            })
            .await;

        let probe = Arc::clone(&bodies);
        wait_until("inbound event reached the bus", move || {
            !probe.lock().is_empty()
        })
        .await;
        // Transport events carry no user attribution.
        assert_eq!(
            *bodies.lock(),
            vec![(None, "search index rebuilt".to_string())]
        );
    }
}

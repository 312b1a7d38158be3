//! # Duplicate Delivery
//!
//! The bus may deliver a message more than once. Each node's dispatcher
//! remembers event ids, so a replayed message never runs a handler twice.

#[cfg(test)]
mod tests {
    use crate::integration::harness::{
        bus, eventually, join, peer, tracker, tracker_config, BusTap, WAIT,
    };
    use fd_03_tracker::JOIN_TIMEOUT_REASON;
    use shared_bus::{DistributionEvent, EventPublisher, EventTopic, WireMessage};
    use shared_types::{ClientJoinRequested, Sha256HashService};
    use std::collections::HashMap;
    use std::time::Duration;

    /// A join request delivered twice is answered once.
    #[tokio::test]
    async fn test_replayed_join_request_answered_once() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 300));
        tracker.start().await.unwrap();
        let mut tap = BusTap::attach(&bus);

        let request = DistributionEvent::ClientJoinRequested(ClientJoinRequested::new(
            Sha256HashService::ALGORITHM_NAME,
            None,
            HashMap::new(),
            HashMap::new(),
            vec!["http://ghost.test".to_string()],
        ));
        let message = WireMessage::from_event("ghost", &request).unwrap();
        bus.publish(message.clone()).await;
        bus.publish(message).await;

        // The ghost never confirms, so the join times out after the accept
        let messages = tap.collect_for(Duration::from_millis(700)).await;
        let accepted = messages
            .iter()
            .filter(|(_, e)| e.topic() == EventTopic::ClientJoinAccepted)
            .count();
        assert_eq!(accepted, 1);

        let denials: Vec<_> = messages
            .iter()
            .filter_map(|(_, e)| match e {
                DistributionEvent::ClientJoinDenied(denied) => Some(denied),
                _ => None,
            })
            .collect();
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].client_identifier, "ghost");
        assert_eq!(denials[0].reason.as_deref(), Some(JOIN_TIMEOUT_REASON));
        assert!(tracker.registered_peers().await.is_empty());
    }

    /// A stale registration replayed after the peer left does not bring it
    /// back into other peers' maps.
    #[tokio::test]
    async fn test_replayed_registration_ignored() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 1_000));
        tracker.start().await.unwrap();
        let peer_a = peer(&bus, "peer-a");
        join(&peer_a).await;

        let mut tap = BusTap::attach(&bus);
        let peer_b = peer(&bus, "peer-b");
        join(&peer_b).await;
        let (sender, registration) = tap.expect(EventTopic::ClientRegistered).await;

        peer_b.shutdown().await.unwrap();
        let peer_ref = &peer_a;
        let forgotten = eventually(WAIT, move || async move {
            !peer_ref.snapshot().await.contains_peer("peer-b")
        })
        .await;
        assert!(forgotten);

        bus.publish(WireMessage::from_event(sender, &registration).unwrap())
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!peer_a.snapshot().await.contains_peer("peer-b"));
        assert!(!tracker.snapshot().await.contains_peer("peer-b"));
    }
}

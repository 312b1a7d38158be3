//! # Join Handshake Flows
//!
//! A peer joining over the bus, end to end:
//!
//! ```text
//! Peer ──ClientJoinRequested──→ Tracker
//! Peer ←──ClientJoinAccepted─── Tracker   (diff + roster)
//! Peer ──ClientJoinSucceeded──→ Tracker
//! all  ←──ClientRegistered───── Tracker
//! ```

#[cfg(test)]
mod tests {
    use crate::integration::harness::{
        bus, endpoint, eventually, fragment, join, peer, tracker, tracker_config, BusTap, WAIT,
    };
    use fd_01_distribution_map::DistributionObserver;
    use fd_04_peer::{PeerError, PeerPhase};
    use shared_bus::{DistributionEvent, EventTopic};
    use shared_types::ClientJoinDeniedCode;
    use std::collections::BTreeSet;

    // =========================================================================
    // SCENARIO A: FIRST PEER
    // =========================================================================

    /// An empty tracker accepts a peer with an empty diff and registers it.
    #[tokio::test]
    async fn test_first_peer_joins_empty_network() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 1_000));
        tracker.start().await.unwrap();
        let mut tap = BusTap::attach(&bus);

        let peer_a = peer(&bus, "peer-a");
        tokio::time::timeout(WAIT, peer_a.initialize(vec!["u1".into()]))
            .await
            .unwrap()
            .unwrap();

        let (sender, request) = tap.expect(EventTopic::ClientJoinRequested).await;
        assert_eq!(sender, "peer-a");
        let DistributionEvent::ClientJoinRequested(request) = request else {
            unreachable!()
        };
        assert!(request.known_file_infos.is_empty());
        assert!(request.stored_fragments.is_empty());
        assert_eq!(request.endpoints, vec!["u1".to_string()]);

        let (sender, accepted) = tap.expect(EventTopic::ClientJoinAccepted).await;
        assert_eq!(sender, "tracker");
        let DistributionEvent::ClientJoinAccepted(accepted) = accepted else {
            unreachable!()
        };
        assert_eq!(accepted.client_identifier, "peer-a");
        assert_eq!(accepted.fragment_size, 1_024);
        assert!(accepted.add_file_infos.is_empty());
        assert!(accepted.add_fragment_infos.is_empty());
        assert!(accepted.remove_file_infos.is_empty());
        assert!(accepted.remove_fragment_infos.is_empty());
        assert!(accepted.clients.is_empty());

        let (sender, _) = tap.expect(EventTopic::ClientJoinSucceeded).await;
        assert_eq!(sender, "peer-a");

        let (_, registered) = tap.expect(EventTopic::ClientRegistered).await;
        let DistributionEvent::ClientRegistered(registered) = registered else {
            unreachable!()
        };
        assert_eq!(registered.client_identifier, "peer-a");
        assert_eq!(registered.info.endpoints, vec!["u1".to_string()]);
        assert!(registered.info.stored_fragments.is_empty());

        let map = tracker.snapshot().await;
        let entry = map.try_get_peer("peer-a").unwrap();
        assert_eq!(entry.endpoints(), &BTreeSet::from(["u1".to_string()]));
        assert!(entry.stored_fragments().is_empty());
        assert_eq!(peer_a.phase().await, PeerPhase::Idle);
    }

    // =========================================================================
    // LATE JOINERS
    // =========================================================================

    /// A peer joining a populated network receives its files, fragments
    /// and roster in the accept diff.
    #[tokio::test]
    async fn test_late_joiner_receives_network_state() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 1_000));
        tracker.start().await.unwrap();
        let peer_a = peer(&bus, "peer-a");
        join(&peer_a).await;

        let (hash, data) = fragment(b"late joiner payload");
        let size = i64::try_from(data.len()).unwrap();
        tracker
            .publish_file_info(&hash, size, std::slice::from_ref(&hash))
            .await
            .unwrap();
        tracker.distribute_fragment(&hash, data).await.unwrap();

        let mut tap = BusTap::attach(&bus);
        let peer_b = peer(&bus, "peer-b");
        join(&peer_b).await;

        let (_, accepted) = tap.expect(EventTopic::ClientJoinAccepted).await;
        let DistributionEvent::ClientJoinAccepted(accepted) = accepted else {
            unreachable!()
        };
        assert_eq!(accepted.client_identifier, "peer-b");
        assert_eq!(accepted.add_file_infos[&hash].fragment_sequence, vec![hash.clone()]);
        assert_eq!(accepted.add_fragment_infos[&hash].size, size);
        let roster = &accepted.clients["peer-a"];
        assert_eq!(roster.endpoints, vec![endpoint("peer-a")]);
        assert_eq!(roster.stored_fragments, vec![hash.clone()]);

        assert!(peer_b.exists_file(&hash).await);
        assert_eq!(
            peer_b.fragment_distribution(&hash).await,
            Some(vec![format!("{}/{hash}", endpoint("peer-a"))])
        );
        let known: Vec<String> = peer_b
            .registered_peers()
            .await
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert!(known.contains(&"peer-a".to_string()));
    }

    /// Peers already registered learn about a newcomer from its
    /// registration broadcast.
    #[tokio::test]
    async fn test_existing_peers_learn_newcomer() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 1_000));
        tracker.start().await.unwrap();
        let peer_a = peer(&bus, "peer-a");
        join(&peer_a).await;

        let peer_b = peer(&bus, "peer-b");
        join(&peer_b).await;

        let peer_ref = &peer_a;
        let learned = eventually(WAIT, move || async move {
            peer_ref
                .snapshot()
                .await
                .try_get_peer("peer-b")
                .is_some_and(|p| p.endpoints().contains(&endpoint("peer-b")))
        })
        .await;
        assert!(learned, "peer-a never learned about peer-b");
    }

    // =========================================================================
    // DENIAL
    // =========================================================================

    /// A second peer claiming a registered endpoint is denied.
    #[tokio::test]
    async fn test_endpoint_conflict_denied() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 1_000));
        tracker.start().await.unwrap();
        let peer_a = peer(&bus, "peer-a");
        join(&peer_a).await;

        let impostor = peer(&bus, "peer-b");
        let result = tokio::time::timeout(WAIT, impostor.initialize(vec![endpoint("peer-a")]))
            .await
            .unwrap();

        assert!(matches!(
            result,
            Err(PeerError::Denied {
                code: ClientJoinDeniedCode::EndpointConflict,
                ..
            })
        ));
        assert_eq!(impostor.phase().await, PeerPhase::Initializing);
        assert!(!tracker.snapshot().await.contains_peer("peer-b"));
    }
}

//! # Fragment Fan-Out Flows
//!
//! ```text
//! Tracker ──Started{H, size}──→ all peers
//! Peer    ──Requested{H}─────→ Tracker        (admission policy permitting)
//! Tracker ──Delivered{H, data, receivers}──→ all peers
//! Peer    ──Obtained{H}──────→ Tracker        (receivers, after verification)
//! Tracker ──Ended{H, size, confirmed}──→ all peers
//! ```
//!
//! The request phase closes early once `desired_replicas` peers volunteered,
//! otherwise on the tracker's timeout.

#[cfg(test)]
mod tests {
    use crate::integration::harness::{
        bus, endpoint, eventually, fragment, join, peer, peer_with, peer_with_policy, topics,
        tracker, tracker_config, BusTap, WAIT,
    };
    use fd_01_distribution_map::DistributionObserver;
    use fd_03_tracker::{TrackerError, TrackerPhase};
    use fd_04_peer::{AcceptAll, AdmissionPolicy, PeerConfig, PeerPhase, PeerService};
    use shared_bus::{DistributionEvent, EventTopic};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn refuse_all() -> Arc<dyn AdmissionPolicy> {
        Arc::new(|_: &str, _: i64| false)
    }

    async fn owners(peer: &PeerService, hash: &str) -> usize {
        peer.snapshot()
            .await
            .try_get_fragment(hash)
            .map_or(0, |f| f.owners().len())
    }

    // =========================================================================
    // SCENARIO B: SINGLE REPLICA
    // =========================================================================

    /// One volunteer, one replica: the full message sequence in order.
    #[tokio::test]
    async fn test_single_replica_message_sequence() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 1_000));
        tracker.start().await.unwrap();
        let peer_a = peer(&bus, "peer-a");
        join(&peer_a).await;

        let (hash, data) = fragment(b"hello, world");
        assert_eq!(data.len(), 12);
        let mut tap = BusTap::attach(&bus);

        let uris = tracker.distribute_fragment(&hash, data.clone()).await.unwrap();
        assert_eq!(uris, vec![format!("{}/{hash}", endpoint("peer-a"))]);

        let messages = tap.drain().await;
        assert_eq!(
            topics(&messages),
            vec![
                EventTopic::FragmentDistributionStarted,
                EventTopic::FragmentDistributionRequested,
                EventTopic::FragmentDistributionDelivered,
                EventTopic::FragmentDistributionObtained,
                EventTopic::FragmentDistributionEnded,
            ]
        );
        let senders: Vec<&str> = messages.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(senders, vec!["tracker", "peer-a", "tracker", "peer-a", "tracker"]);

        match &messages[0].1 {
            DistributionEvent::FragmentDistributionStarted(started) => {
                assert_eq!(started.hash, hash);
                assert_eq!(started.size, 12);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &messages[2].1 {
            DistributionEvent::FragmentDistributionDelivered(delivered) => {
                assert_eq!(delivered.data, data);
                assert_eq!(delivered.receivers, vec!["peer-a".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &messages[4].1 {
            DistributionEvent::FragmentDistributionEnded(ended) => {
                assert_eq!(ended.size, 12);
                assert_eq!(ended.receivers, vec!["peer-a".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(peer_a.read_fragment(&hash).unwrap(), data);
        assert_eq!(tracker.fragment_distribution(&hash).await, Some(uris));
        assert_eq!(tracker.phase().await, TrackerPhase::Idle);
    }

    // =========================================================================
    // REPLICA TARGET
    // =========================================================================

    /// Five volunteers, two wanted: only the first two receive the data,
    /// the rest are released by `Ended`.
    #[tokio::test]
    async fn test_volunteers_beyond_target_released() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(2, 1_000));
        tracker.start().await.unwrap();
        let peers: Vec<PeerService> = (1..=5).map(|i| peer(&bus, &format!("peer-{i}"))).collect();
        for p in &peers {
            join(p).await;
        }

        let (hash, data) = fragment(b"popular fragment");
        let uris = tracker.distribute_fragment(&hash, data).await.unwrap();
        assert_eq!(uris.len(), 2);

        let key = hash.as_str();
        for p in &peers {
            let settled = eventually(WAIT, move || async move {
                p.phase().await == PeerPhase::Idle && owners(p, key).await == 2
            })
            .await;
            assert!(settled, "{} did not settle", p.client_id());
        }
        let holders = peers.iter().filter(|p| p.read_fragment(&hash).is_ok()).count();
        assert_eq!(holders, 2);
    }

    /// Fewer volunteers than wanted: delivery starts on the request timeout.
    #[tokio::test]
    async fn test_short_of_target_delivers_after_timeout() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(3, 300));
        tracker.start().await.unwrap();
        let willing = [peer(&bus, "peer-1"), peer(&bus, "peer-2")];
        let reluctant = peer_with_policy(&bus, "peer-3", refuse_all());
        for p in willing.iter().chain(std::iter::once(&reluctant)) {
            join(p).await;
        }

        let (hash, data) = fragment(b"scarce interest");
        let started = Instant::now();
        let uris = tracker.distribute_fragment(&hash, data).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(uris.len(), 2);
        assert!(reluctant.read_fragment(&hash).is_err());
        for p in &willing {
            assert!(p.read_fragment(&hash).is_ok());
        }
    }

    /// Peers waiting exactly as long as the tracker's volunteer window still
    /// take the delivery that follows it.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_equal_timeouts_short_of_target_deliver() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(3, 300));
        tracker.start().await.unwrap();
        let config = PeerConfig::default().with_timeout_ms(300);
        let peers = [
            peer_with(&bus, "peer-1", config.clone(), Arc::new(AcceptAll)),
            peer_with(&bus, "peer-2", config, Arc::new(AcceptAll)),
        ];
        for p in &peers {
            join(p).await;
        }

        for round in 0..5u8 {
            let (hash, data) = fragment(format!("equal timeouts {round}").as_bytes());
            let uris = tracker.distribute_fragment(&hash, data.clone()).await.unwrap();
            assert_eq!(uris.len(), 2, "round {round}");
            for p in &peers {
                assert_eq!(p.read_fragment(&hash).unwrap(), data);
            }
        }
    }

    /// Nobody volunteers: the distribution fails and nothing is recorded.
    #[tokio::test]
    async fn test_no_volunteers_fails() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 200));
        tracker.start().await.unwrap();
        let peers = [
            peer_with_policy(&bus, "peer-1", refuse_all()),
            peer_with_policy(&bus, "peer-2", refuse_all()),
        ];
        for p in &peers {
            join(p).await;
        }

        let (hash, data) = fragment(b"nobody wants this");
        let result = tracker.distribute_fragment(&hash, data).await;

        assert!(matches!(result, Err(TrackerError::NoVolunteers(h)) if h == hash));
        assert!(!tracker.exists_fragment(&hash).await);
        assert_eq!(tracker.phase().await, TrackerPhase::Idle);
    }

    /// Distributions requested back to back run one after the other.
    #[tokio::test]
    async fn test_concurrent_distributions_serialized() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 1_000));
        tracker.start().await.unwrap();
        let peer_a = peer(&bus, "peer-a");
        join(&peer_a).await;

        let first = fragment(b"first of two");
        let second = fragment(b"second of two");
        let (a, b) = tokio::join!(
            tracker.distribute_fragment(&first.0, first.1.clone()),
            tracker.distribute_fragment(&second.0, second.1.clone()),
        );

        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 1);
        assert_eq!(peer_a.read_fragment(&first.0).unwrap(), first.1);
        assert_eq!(peer_a.read_fragment(&second.0).unwrap(), second.1);
    }
}

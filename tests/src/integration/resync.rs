//! # Resynchronization Flows
//!
//! Tracker restarts and peer departures. Peers drop back to
//! `Initializing` on `TrackerGoodbye` and rejoin on `TrackerHello`,
//! declaring what they committed and stored so a fresh tracker can rebuild
//! its map from them.

#[cfg(test)]
mod tests {
    use crate::integration::harness::{
        bus, eventually, fragment, join, peer, tracker, tracker_config, WAIT,
    };
    use fd_01_distribution_map::DistributionObserver;
    use fd_03_tracker::TrackerService;
    use fd_04_peer::{PeerPhase, PeerService};
    use std::collections::BTreeSet;

    async fn peer_ids(tracker: &TrackerService) -> Vec<String> {
        tracker
            .registered_peers()
            .await
            .iter()
            .map(|p| p.id().to_string())
            .collect()
    }

    async fn knows_peer(peer: &PeerService, id: &str) -> bool {
        peer.snapshot().await.contains_peer(id)
    }

    /// A replacement tracker learns files, fragments and owners from the
    /// peers that rejoin after its hello.
    #[tokio::test]
    async fn test_replacement_tracker_rebuilt_from_peers() {
        let bus = bus();
        let first = tracker(&bus, "tracker-1", tracker_config(2, 1_000));
        first.start().await.unwrap();
        let peers = [peer(&bus, "peer-a"), peer(&bus, "peer-b")];
        for p in &peers {
            join(p).await;
        }

        let (hash, data) = fragment(b"survives the tracker");
        let size = i64::try_from(data.len()).unwrap();
        first
            .publish_file_info(&hash, size, std::slice::from_ref(&hash))
            .await
            .unwrap();
        assert_eq!(first.distribute_fragment(&hash, data).await.unwrap().len(), 2);

        first.shutdown().await.unwrap();
        for p in &peers {
            let reset = eventually(WAIT, move || async move {
                p.phase().await == PeerPhase::Initializing
            })
            .await;
            assert!(reset, "{} kept its registration", p.client_id());
        }

        let second = tracker(&bus, "tracker-2", tracker_config(2, 1_000));
        second.start().await.unwrap();
        let second_ref = &second;
        let rejoined = eventually(WAIT, move || async move {
            peer_ids(second_ref).await == ["peer-a", "peer-b"]
        })
        .await;
        assert!(rejoined, "peers did not rejoin the replacement tracker");
        for p in &peers {
            let idle =
                eventually(WAIT, move || async move { p.phase().await == PeerPhase::Idle }).await;
            assert!(idle, "{} did not finish rejoining", p.client_id());
        }

        assert!(second.exists_file(&hash).await);
        let map = second.snapshot().await;
        let owners: BTreeSet<&str> = map
            .try_get_fragment(&hash)
            .unwrap()
            .owners()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(owners, BTreeSet::from(["peer-a", "peer-b"]));
        assert_eq!(second.fragment_distribution(&hash).await.unwrap().len(), 2);
    }

    /// A tracker goodbye alone resets peers without rejoining.
    #[tokio::test]
    async fn test_goodbye_without_hello_leaves_peers_waiting() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 1_000));
        tracker.start().await.unwrap();
        let peer_a = peer(&bus, "peer-a");
        join(&peer_a).await;

        tracker.shutdown().await.unwrap();
        let peer_ref = &peer_a;
        assert!(
            eventually(WAIT, move || async move {
                peer_ref.phase().await == PeerPhase::Initializing
            })
            .await
        );
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(peer_a.phase().await, PeerPhase::Initializing);
    }

    /// A departing peer is dropped by the tracker and by its fellow peers.
    #[tokio::test]
    async fn test_peer_goodbye_removes_it_everywhere() {
        let bus = bus();
        let tracker = tracker(&bus, "tracker", tracker_config(1, 1_000));
        tracker.start().await.unwrap();
        let peer_a = peer(&bus, "peer-a");
        let peer_b = peer(&bus, "peer-b");
        join(&peer_a).await;
        join(&peer_b).await;
        let peer_ref = &peer_a;
        assert!(
            eventually(WAIT, move || async move { knows_peer(peer_ref, "peer-b").await }).await
        );

        peer_b.shutdown().await.unwrap();

        let tracker_ref = &tracker;
        assert!(
            eventually(WAIT, move || async move {
                peer_ids(tracker_ref).await == ["peer-a"]
            })
            .await
        );
        assert!(
            eventually(WAIT, move || async move { !knows_peer(peer_ref, "peer-b").await }).await
        );
        assert_eq!(peer_b.phase().await, PeerPhase::Disposed);
    }
}

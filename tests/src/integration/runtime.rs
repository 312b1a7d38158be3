//! # Node Runtime Flows
//!
//! The binary's assembly path, driven from a configuration file.

#[cfg(test)]
mod tests {
    use fd_01_distribution_map::DistributionObserver;
    use node_runtime::{NodeConfig, NodeRuntime};
    use std::collections::HashMap;

    /// A TOML file plus an environment override drive a full demo run.
    #[tokio::test]
    async fn test_configured_node_replicates_demo_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(
            &path,
            r#"
            [tracker]
            fragment_size = 4096
            timeout_ms = 2000

            [peer]
            count = 4
            endpoint_base = "http://cluster.test"

            [demo]
            file_size = 10000
            "#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = HashMap::from([("FD_DESIRED_REPLICAS", "2")]);

        let config =
            NodeConfig::resolve(Some(&path), |var| env.get(var).map(|v| (*v).to_string()))
                .unwrap();
        assert_eq!(config.tracker.desired_replicas, 2);

        let runtime = NodeRuntime::new(config).unwrap();
        let report = runtime
            .run_until(std::future::pending())
            .await
            .unwrap()
            .unwrap();

        // 10000 bytes in 4096-byte fragments
        assert_eq!(report.replicas.len(), 3);
        for (hash, uris) in &report.replicas {
            assert_eq!(uris.len(), 2);
            for uri in uris {
                assert!(uri.starts_with("http://cluster.test/peer-"));
                assert!(uri.ends_with(hash.as_str()));
            }
        }
        assert_eq!(runtime.network().tracker().fragment_size().await, Some(4096));
    }
}

//! # Demo Distribution
//!
//! Generates a file, announces it and replicates each fragment onto the
//! network's peers, then reassembles it from peer storage.

use crate::config::DemoConfig;
use crate::wiring::Network;
use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use shared_types::HashService;
use tracing::info;

/// A generated file cut into fragments.
#[derive(Debug, Clone)]
pub struct DemoFile {
    pub hash: String,
    pub size: i64,
    /// Fragment hashes and payloads, in file order.
    pub fragments: Vec<(String, Vec<u8>)>,
}

impl DemoFile {
    /// Generate `file_size` seeded bytes cut into `fragment_size` pieces.
    #[must_use]
    pub fn generate(
        file_size: usize,
        fragment_size: usize,
        seed: u64,
        hashing: &dyn HashService,
    ) -> Self {
        let mut content = vec![0u8; file_size];
        StdRng::seed_from_u64(seed).fill_bytes(&mut content);

        let fragments = content
            .chunks(fragment_size.max(1))
            .map(|chunk| (hashing.compute_digest(chunk), chunk.to_vec()))
            .collect();
        Self {
            hash: hashing.compute_digest(&content),
            size: i64::try_from(file_size).unwrap_or(i64::MAX),
            fragments,
        }
    }

    #[must_use]
    pub fn fragment_sequence(&self) -> Vec<String> {
        self.fragments.iter().map(|(hash, _)| hash.clone()).collect()
    }
}

/// Outcome of a demo run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    pub file_hash: String,
    /// Fetch URIs per fragment, in file order.
    pub replicas: Vec<(String, Vec<String>)>,
}

/// Publish and replicate a generated file, then verify it can be rebuilt
/// from what the peers stored.
///
/// # Errors
///
/// Fails if the tracker rejects the file or a fragment, or if the
/// reassembled content does not match the file hash.
pub async fn run(
    network: &Network,
    demo: &DemoConfig,
    hashing: &dyn HashService,
) -> Result<DemoReport> {
    let tracker = network.tracker();
    let fragment_size = usize::try_from(tracker.config().fragment_size)
        .context("Fragment size does not fit in memory")?;
    let file = DemoFile::generate(demo.file_size, fragment_size, demo.seed, hashing);

    info!(
        file = %file.hash,
        size = file.size,
        fragments = file.fragments.len(),
        "Publishing demo file"
    );
    tracker
        .publish_file_info(&file.hash, file.size, &file.fragment_sequence())
        .await
        .context("Failed to publish demo file")?;

    let mut replicas = Vec::with_capacity(file.fragments.len());
    for (hash, data) in &file.fragments {
        let uris = tracker
            .distribute_fragment(hash, data.clone())
            .await
            .with_context(|| format!("Failed to distribute fragment {hash}"))?;
        info!(fragment = %hash, replicas = uris.len(), "Fragment replicated");
        replicas.push((hash.clone(), uris));
    }

    let mut content = Vec::with_capacity(demo.file_size);
    for (hash, _) in &file.fragments {
        let Some(data) = network.fetch_fragment(hash) else {
            bail!("No peer stores fragment {hash}");
        };
        content.extend_from_slice(&data);
    }
    let digest = hashing.compute_digest(&content);
    if digest != file.hash {
        bail!("Reassembled digest {digest} does not match {}", file.hash);
    }

    info!(file = %file.hash, "Demo file reassembled from peers");
    Ok(DemoReport {
        file_hash: file.hash,
        replicas,
    })
}

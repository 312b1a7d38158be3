//! # Join Reconciliation
//!
//! Computes the diff the tracker sends a joining peer and what it learns
//! from the peer in return.
//!
//! | Tracker has | Peer declares | Result |
//! |-------------|---------------|--------|
//! | entry       | nothing       | add to peer |
//! | entry       | same entry    | nothing |
//! | entry       | other entry   | remove from peer, then add |
//! | nothing     | entry         | learned by tracker |

use fd_01_distribution_map::DistributionMap;
use shared_types::{
    ClientJoinRequested, ContentHash, FileMetadata, FragmentMetadata, HashService,
};
use std::collections::HashMap;

/// A join request's declarations with every hash normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    pub known_files: HashMap<ContentHash, FileMetadata>,
    pub stored_fragments: HashMap<ContentHash, FragmentMetadata>,
}

/// Validate and normalize the hashes and sizes a joining peer declares.
///
/// # Errors
///
/// Returns a human-readable reason for the first invalid entry.
pub fn normalize_declarations(
    request: &ClientJoinRequested,
    hashing: &dyn HashService,
) -> Result<Declarations, String> {
    let normalize = |hash: &str| {
        hashing
            .try_normalize(hash)
            .ok_or_else(|| format!("Invalid hash format: '{hash}'"))
    };

    let mut declarations = Declarations::default();
    for (hash, meta) in &request.known_file_infos {
        if meta.size <= 0 {
            return Err(format!("Invalid size {} for file '{hash}'", meta.size));
        }
        let sequence = meta
            .fragment_sequence
            .iter()
            .map(|fragment| normalize(fragment))
            .collect::<Result<Vec<_>, _>>()?;
        declarations
            .known_files
            .insert(normalize(hash)?, FileMetadata::new(meta.size, sequence));
    }
    for (hash, meta) in &request.stored_fragments {
        if meta.size <= 0 {
            return Err(format!("Invalid size {} for fragment '{hash}'", meta.size));
        }
        declarations.stored_fragments.insert(normalize(hash)?, *meta);
    }
    Ok(declarations)
}

/// Outcome of reconciling a peer's declarations with the tracker's map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinPlan {
    pub add_files: HashMap<ContentHash, FileMetadata>,
    pub add_fragments: HashMap<ContentHash, FragmentMetadata>,
    pub remove_files: Vec<ContentHash>,
    pub remove_fragments: Vec<ContentHash>,
    /// Files the tracker did not know.
    pub learned_files: HashMap<ContentHash, FileMetadata>,
    /// Fragments the tracker did not know.
    pub learned_fragments: HashMap<ContentHash, FragmentMetadata>,
    /// Stored fragments the peer keeps after applying the diff.
    pub stored_fragments: Vec<ContentHash>,
}

/// Reconcile `declared` against `map`. The tracker's entries win.
#[must_use]
pub fn plan_join(map: &DistributionMap, declared: &Declarations) -> JoinPlan {
    let mut plan = JoinPlan::default();

    for file in map.files() {
        match declared.known_files.get(file.hash()) {
            Some(meta) if file.matches_metadata(meta) => {}
            Some(_) => {
                plan.remove_files.push(file.hash().to_string());
                plan.add_files.insert(file.hash().to_string(), file.to_metadata());
            }
            None => {
                plan.add_files.insert(file.hash().to_string(), file.to_metadata());
            }
        }
    }
    for (hash, meta) in &declared.known_files {
        if !map.contains_file(hash) {
            plan.learned_files.insert(hash.clone(), meta.clone());
        }
    }

    for fragment in map.fragments() {
        match declared.stored_fragments.get(fragment.hash()) {
            Some(meta) if meta.size == fragment.size() => {}
            Some(_) => {
                plan.remove_fragments.push(fragment.hash().to_string());
                plan.add_fragments
                    .insert(fragment.hash().to_string(), fragment.to_metadata());
            }
            None => {
                plan.add_fragments
                    .insert(fragment.hash().to_string(), fragment.to_metadata());
            }
        }
    }
    for (hash, meta) in &declared.stored_fragments {
        match map.try_get_fragment(hash) {
            None => {
                plan.learned_fragments.insert(hash.clone(), *meta);
                plan.stored_fragments.push(hash.clone());
            }
            Some(fragment) if fragment.size() == meta.size => {
                plan.stored_fragments.push(hash.clone());
            }
            Some(_) => {}
        }
    }

    plan.remove_files.sort();
    plan.remove_fragments.sort();
    plan.stored_fragments.sort();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use fd_01_distribution_map::FragmentedFileInfo;
    use shared_types::Sha256HashService;

    fn hash(c: char) -> String {
        c.to_string().repeat(64)
    }

    fn declared(
        files: &[(String, FileMetadata)],
        fragments: &[(String, i64)],
    ) -> Declarations {
        Declarations {
            known_files: files.iter().cloned().collect(),
            stored_fragments: fragments
                .iter()
                .map(|(h, size)| (h.clone(), FragmentMetadata::new(*size)))
                .collect(),
        }
    }

    #[test]
    fn test_empty_join_is_empty_plan() {
        let plan = plan_join(&DistributionMap::new(), &Declarations::default());
        assert_eq!(plan, JoinPlan::default());
    }

    #[test]
    fn test_tracker_entries_added_to_fresh_peer() {
        let mut map = DistributionMap::new();
        map.try_add_file(FragmentedFileInfo::new(hash('F'), 10, vec![hash('A')]).unwrap());
        map.try_add_fragment(hash('A'), 10);

        let plan = plan_join(&map, &Declarations::default());
        assert_eq!(plan.add_files[&hash('F')], FileMetadata::new(10, vec![hash('A')]));
        assert_eq!(plan.add_fragments[&hash('A')], FragmentMetadata::new(10));
        assert!(plan.remove_files.is_empty());
        assert!(plan.learned_fragments.is_empty());
    }

    #[test]
    fn test_conflicting_entries_replaced() {
        let mut map = DistributionMap::new();
        map.try_add_file(FragmentedFileInfo::new(hash('F'), 10, vec![hash('A')]).unwrap());
        map.try_add_fragment(hash('A'), 10);

        let plan = plan_join(
            &map,
            &declared(&[(hash('F'), FileMetadata::new(11, vec![hash('A')]))], &[(hash('A'), 9)]),
        );
        assert_eq!(plan.remove_files, vec![hash('F')]);
        assert_eq!(plan.remove_fragments, vec![hash('A')]);
        assert!(plan.add_files.contains_key(&hash('F')));
        assert!(plan.add_fragments.contains_key(&hash('A')));
        assert!(plan.stored_fragments.is_empty());
    }

    #[test]
    fn test_matching_entries_untouched_and_unknown_learned() {
        let mut map = DistributionMap::new();
        map.try_add_fragment(hash('A'), 10);

        let plan = plan_join(
            &map,
            &declared(
                &[(hash('G'), FileMetadata::new(4, vec![hash('B')]))],
                &[(hash('A'), 10), (hash('B'), 4)],
            ),
        );
        assert!(plan.add_fragments.is_empty());
        assert!(plan.remove_fragments.is_empty());
        assert_eq!(plan.learned_files.len(), 1);
        assert_eq!(plan.learned_fragments[&hash('B')], FragmentMetadata::new(4));
        assert_eq!(plan.stored_fragments, vec![hash('A'), hash('B')]);
    }

    #[test]
    fn test_declarations_normalized() {
        let request = ClientJoinRequested::new(
            "SHA256",
            None,
            [("f".repeat(64), FileMetadata::new(3, vec!["a".repeat(64)]))].into(),
            [("b".repeat(64), FragmentMetadata::new(3))].into(),
            vec![],
        );
        let declared = normalize_declarations(&request, &Sha256HashService::new()).unwrap();
        assert_eq!(
            declared.known_files[&hash('F')].fragment_sequence,
            vec![hash('A')]
        );
        assert!(declared.stored_fragments.contains_key(&hash('B')));
    }

    #[test]
    fn test_invalid_declarations_rejected() {
        let hashing = Sha256HashService::new();
        let bad_hash = ClientJoinRequested::new(
            "SHA256",
            None,
            HashMap::new(),
            [("xyz".to_string(), FragmentMetadata::new(3))].into(),
            vec![],
        );
        assert!(normalize_declarations(&bad_hash, &hashing).is_err());

        let bad_size = ClientJoinRequested::new(
            "SHA256",
            None,
            HashMap::new(),
            [(hash('A'), FragmentMetadata::new(0))].into(),
            vec![],
        );
        assert!(normalize_declarations(&bad_size, &hashing).is_err());
    }
}

//! Consistency checks over a [`DistributionMap`].

use super::errors::InvariantViolation;
use super::map::DistributionMap;
use shared_types::HashService;
use std::collections::BTreeSet;

/// Every fragment's owners equal the peers storing it.
///
/// # Errors
///
/// Returns the first `InvariantViolation::OwnerMismatch` found.
pub fn check_owner_consistency(map: &DistributionMap) -> Result<(), InvariantViolation> {
    for fragment in map.fragments() {
        let storing: BTreeSet<&str> = map
            .peers()
            .filter(|peer| peer.stored_fragments().contains(fragment.hash()))
            .map(|peer| peer.id())
            .collect();
        let owners: BTreeSet<&str> = fragment.owners().iter().map(String::as_str).collect();
        if owners != storing {
            return Err(InvariantViolation::OwnerMismatch {
                hash: fragment.hash().to_string(),
                owners: owners.into_iter().map(str::to_string).collect(),
                storing: storing.into_iter().map(str::to_string).collect(),
            });
        }
    }
    Ok(())
}

/// Every file and fragment key is normalized by `hashing`.
///
/// # Errors
///
/// Returns `InvariantViolation::KeyMismatch` for the first offending key.
pub fn check_normalized_keys(
    map: &DistributionMap,
    hashing: &dyn HashService,
) -> Result<(), InvariantViolation> {
    let keys = map
        .files()
        .map(|f| f.hash())
        .chain(map.fragments().map(|f| f.hash()));
    for key in keys {
        let normalized = hashing.normalize(key);
        if normalized != key {
            return Err(InvariantViolation::KeyMismatch {
                key: key.to_string(),
                entry: normalized,
            });
        }
    }
    Ok(())
}

/// The aggregate endpoint set is the union of peer endpoints.
///
/// # Errors
///
/// Returns `InvariantViolation::EndpointsOutOfSync` on mismatch.
pub fn check_endpoints(map: &DistributionMap) -> Result<(), InvariantViolation> {
    let union: BTreeSet<String> = map
        .peers()
        .flat_map(|peer| peer.endpoints().iter().cloned())
        .collect();
    if &union == map.endpoints() {
        Ok(())
    } else {
        Err(InvariantViolation::EndpointsOutOfSync)
    }
}

/// Run every structural check.
///
/// # Errors
///
/// Returns the first violation found.
pub fn check_invariants(
    map: &DistributionMap,
    hashing: &dyn HashService,
) -> Result<(), InvariantViolation> {
    check_owner_consistency(map)?;
    check_normalized_keys(map, hashing)?;
    check_endpoints(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Sha256HashService;

    #[test]
    fn test_lowercase_key_detected() {
        let mut map = DistributionMap::new();
        map.try_add_fragment("ab".repeat(32), 5);
        let result = check_normalized_keys(&map, &Sha256HashService::new());
        assert!(matches!(result, Err(InvariantViolation::KeyMismatch { .. })));
    }

    #[test]
    fn test_consistent_map_passes() {
        let mut map = DistributionMap::new();
        let hash = "AB".repeat(32);
        map.try_add_fragment(hash.clone(), 5);
        map.try_add_peer("p1", vec!["u1".to_string()], vec![hash]);
        assert!(check_invariants(&map, &Sha256HashService::new()).is_ok());
    }
}

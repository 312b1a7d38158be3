//! Volunteer admission for announced fragments.

/// Decides whether this peer volunteers to store an announced fragment.
pub trait AdmissionPolicy: Send + Sync {
    fn admit(&self, hash: &str, size: i64) -> bool;
}

/// Volunteers for every fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AdmissionPolicy for AcceptAll {
    fn admit(&self, _hash: &str, _size: i64) -> bool {
        true
    }
}

impl<F> AdmissionPolicy for F
where
    F: Fn(&str, i64) -> bool + Send + Sync,
{
    fn admit(&self, hash: &str, size: i64) -> bool {
        self(hash, size)
    }
}

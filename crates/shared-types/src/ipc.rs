//! # Wire Message Payloads
//!
//! Defines every JSON document published on the distribution bus.
//!
//! ## Design Rules
//!
//! - Property names are PascalCase.
//! - Every payload carries a mandatory `EventId` used for deduplication.
//! - Payloads never carry their sender; the transport envelope does.
//! - Unknown properties are ignored; missing or duplicated required
//!   properties fail decoding of that single message.

use crate::entities::{
    ClientJoinDeniedCode, ClientMetadata, ContentHash, FileMetadata, FragmentMetadata, PeerId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// =============================================================================
// TRACKER LIFECYCLE
// =============================================================================

/// The tracker (re)started; peers must rejoin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrackerHello {
    pub event_id: Uuid,
}

impl TrackerHello {
    #[must_use]
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
        }
    }
}

impl Default for TrackerHello {
    fn default() -> Self {
        Self::new()
    }
}

/// The tracker is leaving the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrackerGoodbye {
    pub event_id: Uuid,
}

impl TrackerGoodbye {
    #[must_use]
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
        }
    }
}

impl Default for TrackerGoodbye {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// JOIN HANDSHAKE
// =============================================================================

/// A peer asks to join, declaring everything it already knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientJoinRequested {
    pub event_id: Uuid,
    pub hash_algorithm: String,
    /// Fragment size from the peer's last committed join, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_size: Option<i64>,
    pub known_file_infos: HashMap<ContentHash, FileMetadata>,
    pub stored_fragments: HashMap<ContentHash, FragmentMetadata>,
    pub endpoints: Vec<String>,
}

impl ClientJoinRequested {
    #[must_use]
    pub fn new(
        hash_algorithm: impl Into<String>,
        fragment_size: Option<i64>,
        known_file_infos: HashMap<ContentHash, FileMetadata>,
        stored_fragments: HashMap<ContentHash, FragmentMetadata>,
        endpoints: Vec<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            hash_algorithm: hash_algorithm.into(),
            fragment_size,
            known_file_infos,
            stored_fragments,
            endpoints,
        }
    }
}

/// The tracker accepts a join and sends the reconciliation diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientJoinAccepted {
    pub event_id: Uuid,
    pub client_identifier: PeerId,
    pub fragment_size: i64,
    pub add_file_infos: HashMap<ContentHash, FileMetadata>,
    pub add_fragment_infos: HashMap<ContentHash, FragmentMetadata>,
    pub remove_file_infos: Vec<ContentHash>,
    pub remove_fragment_infos: Vec<ContentHash>,
    /// Every other registered peer.
    pub clients: HashMap<PeerId, ClientMetadata>,
}

/// The tracker refuses a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientJoinDenied {
    pub event_id: Uuid,
    pub client_identifier: PeerId,
    pub reason_code: ClientJoinDeniedCode,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ClientJoinDenied {
    #[must_use]
    pub fn new(
        client_identifier: impl Into<PeerId>,
        reason_code: ClientJoinDeniedCode,
        reason: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            client_identifier: client_identifier.into(),
            reason_code,
            reason,
        }
    }
}

/// The joining peer applied the accepted diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientJoinSucceeded {
    pub event_id: Uuid,
}

impl ClientJoinSucceeded {
    #[must_use]
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
        }
    }
}

impl Default for ClientJoinSucceeded {
    fn default() -> Self {
        Self::new()
    }
}

/// The joining peer could not apply the accepted diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientJoinFailed {
    pub event_id: Uuid,
}

impl ClientJoinFailed {
    #[must_use]
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
        }
    }
}

impl Default for ClientJoinFailed {
    fn default() -> Self {
        Self::new()
    }
}

/// Broadcast after a join completes so every node converges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientRegistered {
    pub event_id: Uuid,
    pub client_identifier: PeerId,
    pub info: ClientMetadata,
    /// Files the tracker learned from this peer.
    pub added_files: HashMap<ContentHash, FileMetadata>,
    /// Fragments the tracker learned from this peer.
    pub added_fragments: HashMap<ContentHash, FragmentMetadata>,
}

/// A peer is leaving the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientGoodbye {
    pub event_id: Uuid,
}

impl ClientGoodbye {
    #[must_use]
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
        }
    }
}

impl Default for ClientGoodbye {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// A new file was published by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileInfoPublished {
    pub event_id: Uuid,
    pub hash: ContentHash,
    pub size: i64,
    pub fragment_sequence: Vec<ContentHash>,
}

impl FileInfoPublished {
    #[must_use]
    pub fn new(
        hash: impl Into<ContentHash>,
        size: i64,
        fragment_sequence: Vec<ContentHash>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            hash: hash.into(),
            size,
            fragment_sequence,
        }
    }
}

// =============================================================================
// FRAGMENT FAN-OUT
// =============================================================================

/// The tracker opens a volunteer window for a new fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FragmentDistributionStarted {
    pub event_id: Uuid,
    pub hash: ContentHash,
    pub size: i64,
}

impl FragmentDistributionStarted {
    #[must_use]
    pub fn new(hash: impl Into<ContentHash>, size: i64) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            hash: hash.into(),
            size,
        }
    }
}

/// A peer volunteers to store a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FragmentDistributionRequested {
    pub event_id: Uuid,
    pub hash: ContentHash,
}

impl FragmentDistributionRequested {
    #[must_use]
    pub fn new(hash: impl Into<ContentHash>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            hash: hash.into(),
        }
    }
}

/// The tracker ships the fragment bytes to the selected volunteers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FragmentDistributionDelivered {
    pub event_id: Uuid,
    pub hash: ContentHash,
    #[serde(with = "crate::encoding")]
    pub data: Vec<u8>,
    pub receivers: Vec<PeerId>,
}

impl FragmentDistributionDelivered {
    #[must_use]
    pub fn new(hash: impl Into<ContentHash>, data: Vec<u8>, receivers: Vec<PeerId>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            hash: hash.into(),
            data,
            receivers,
        }
    }
}

/// A receiver verified and stored the fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FragmentDistributionObtained {
    pub event_id: Uuid,
    pub hash: ContentHash,
}

impl FragmentDistributionObtained {
    #[must_use]
    pub fn new(hash: impl Into<ContentHash>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            hash: hash.into(),
        }
    }
}

/// A receiver rejected or could not store the fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FragmentDistributionFailed {
    pub event_id: Uuid,
    pub hash: ContentHash,
}

impl FragmentDistributionFailed {
    #[must_use]
    pub fn new(hash: impl Into<ContentHash>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            hash: hash.into(),
        }
    }
}

/// The fan-out finished; `receivers` confirmed ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FragmentDistributionEnded {
    pub event_id: Uuid,
    pub hash: ContentHash,
    pub size: i64,
    pub receivers: Vec<PeerId>,
}

impl FragmentDistributionEnded {
    #[must_use]
    pub fn new(hash: impl Into<ContentHash>, size: i64, receivers: Vec<PeerId>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            hash: hash.into(),
            size,
            receivers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fragment_size_absent_when_none() {
        let request =
            ClientJoinRequested::new("SHA256", None, HashMap::new(), HashMap::new(), vec![]);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("FragmentSize").is_none());
        assert_eq!(value["HashAlgorithm"], "SHA256");
    }

    #[test]
    fn test_fragment_size_null_and_absent_decode_to_none() {
        let id = Uuid::new_v4();
        let with_null = json!({
            "EventId": id.to_string(),
            "HashAlgorithm": "SHA256",
            "FragmentSize": null,
            "KnownFileInfos": {},
            "StoredFragments": {},
            "Endpoints": []
        });
        let mut absent = with_null.clone();
        absent.as_object_mut().unwrap().remove("FragmentSize");

        let a: ClientJoinRequested = serde_json::from_value(with_null).unwrap();
        let b: ClientJoinRequested = serde_json::from_value(absent).unwrap();
        assert_eq!(a.fragment_size, None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_event_id_fails() {
        let result: Result<FragmentDistributionRequested, _> =
            serde_json::from_value(json!({ "Hash": "AB" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_properties_skipped() {
        let id = Uuid::new_v4();
        let decoded: FragmentDistributionObtained = serde_json::from_value(json!({
            "EventId": id.to_string(),
            "Hash": "AB",
            "Extra": { "Nested": [1, 2, 3] }
        }))
        .unwrap();
        assert_eq!(decoded.event_id, id);
        assert_eq!(decoded.hash, "AB");
    }

    #[test]
    fn test_duplicate_property_fails() {
        let id = Uuid::new_v4();
        let text = format!(r#"{{"EventId":"{id}","Hash":"AB","Hash":"CD"}}"#);
        let result: Result<FragmentDistributionFailed, _> = serde_json::from_str(&text);
        assert!(result.is_err());
    }

    #[test]
    fn test_delivered_data_is_base64() {
        let event = FragmentDistributionDelivered::new("AB", b"hello".to_vec(), vec!["p1".into()]);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["Data"], "aGVsbG8=");
        assert_eq!(value["Receivers"][0], "p1");
    }

    #[test]
    fn test_denied_reason_null() {
        let denied = ClientJoinDenied::new("p1", ClientJoinDeniedCode::WrongHashAlgorithm, None);
        let value = serde_json::to_value(&denied).unwrap();
        assert_eq!(value["ReasonCode"], 2);
        assert!(value["Reason"].is_null());
        assert_eq!(value["ClientIdentifier"], "p1");
    }

    #[test]
    fn test_event_id_accepts_simple_guid_form() {
        let id = Uuid::new_v4();
        let decoded: TrackerHello =
            serde_json::from_value(json!({ "EventId": id.simple().to_string() })).unwrap();
        assert_eq!(decoded.event_id, id);
    }
}

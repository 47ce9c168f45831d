use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DocumentId, UserId};

/// Opaque serialized scene. The server never looks inside.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenePayload(serde_json::Value);

impl ScenePayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The scene a freshly created document starts with
    pub fn empty() -> Self {
        Self(serde_json::json!({}))
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_json(self) -> serde_json::Value {
        self.0
    }

    /// Size of the payload once serialized, used for the size bound
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.0).map(|v| v.len()).unwrap_or(usize::MAX)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

impl Role {
    /// Whether this role may replace the scene
    pub fn can_edit(self) -> bool {
        matches!(self, Role::Owner | Role::Editor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "editor" => Ok(Role::Editor),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: UserId,
    pub role: Role,
}

/// Current state of a document. History lives in [`Version`] rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub owner: UserId,
    pub scene: ScenePayload,
    /// Sequence number of the newest version, 0 when no version exists yet
    pub head_seq: u64,
    pub collaborators: Vec<Collaborator>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Resolve the role of a user on this document.
    ///
    /// The owner is always `Owner`, whatever the collaborator list says.
    pub fn role_of(&self, user: &UserId) -> Option<Role> {
        if &self.owner == user {
            return Some(Role::Owner);
        }
        self.collaborators
            .iter()
            .find(|c| &c.user_id == user)
            .map(|c| c.role)
    }

    pub fn is_visible_to(&self, user: &UserId) -> bool {
        self.role_of(user).is_some()
    }
}

/// Deduplicate a collaborator list: one entry per user, last one wins,
/// and the owner is never listed (ownership already implies full rights).
pub fn normalize_collaborators(owner: &UserId, collaborators: Vec<Collaborator>) -> Vec<Collaborator> {
    let mut out: Vec<Collaborator> = Vec::with_capacity(collaborators.len());
    for collaborator in collaborators {
        if &collaborator.user_id == owner {
            continue;
        }
        if let Some(existing) = out.iter_mut().find(|c| c.user_id == collaborator.user_id) {
            existing.role = collaborator.role;
        } else {
            out.push(collaborator);
        }
    }
    out
}

/// Immutable snapshot of a scene
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub seq: u64,
    pub scene: ScenePayload,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a document
#[derive(Clone, Debug)]
pub struct NewDocument {
    pub id: Option<DocumentId>,
    pub owner: UserId,
    pub scene: ScenePayload,
    pub collaborators: Vec<Collaborator>,
}

/// Window into the version history.
///
/// With `from` set, versions with `seq >= from` are returned oldest first.
/// Without it, the newest `limit` versions are returned, still oldest first.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionRange {
    pub from: Option<u64>,
    pub limit: Option<usize>,
}

impl VersionRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn latest(limit: usize) -> Self {
        Self { from: None, limit: Some(limit) }
    }

    /// Apply the window to a history sorted by ascending seq
    pub fn select<'a>(&self, history: &'a [Version]) -> &'a [Version] {
        match self.from {
            Some(from) => {
                let start = history.partition_point(|v| v.seq < from);
                let rest = &history[start..];
                match self.limit {
                    Some(limit) => &rest[..limit.min(rest.len())],
                    None => rest,
                }
            }
            None => match self.limit {
                Some(limit) => &history[history.len().saturating_sub(limit)..],
                None => history,
            },
        }
    }
}

/// A document together with a slice of its history
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedDocument {
    pub document: Document,
    pub versions: Vec<Version>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(seq: u64) -> Version {
        Version { seq, scene: ScenePayload::empty(), created_at: Utc::now() }
    }

    #[test]
    fn owner_outranks_collaborator_entry() {
        let now = Utc::now();
        let doc = Document {
            id: DocumentId::from("d"),
            owner: UserId::from("alice"),
            scene: ScenePayload::empty(),
            head_seq: 0,
            collaborators: vec![
                Collaborator { user_id: UserId::from("alice"), role: Role::Viewer },
                Collaborator { user_id: UserId::from("bob"), role: Role::Viewer },
            ],
            created_at: now,
            updated_at: now,
        };
        assert_eq!(doc.role_of(&UserId::from("alice")), Some(Role::Owner));
        assert_eq!(doc.role_of(&UserId::from("bob")), Some(Role::Viewer));
        assert_eq!(doc.role_of(&UserId::from("carol")), None);
    }

    #[test]
    fn normalize_keeps_last_role_and_drops_owner() {
        let owner = UserId::from("alice");
        let list = vec![
            Collaborator { user_id: UserId::from("bob"), role: Role::Viewer },
            Collaborator { user_id: owner.clone(), role: Role::Editor },
            Collaborator { user_id: UserId::from("bob"), role: Role::Editor },
        ];
        let normalized = normalize_collaborators(&owner, list);
        assert_eq!(normalized, vec![Collaborator { user_id: UserId::from("bob"), role: Role::Editor }]);
    }

    #[test]
    fn version_range_windows() {
        let history: Vec<Version> = (1..=10).map(version).collect();
        let seqs = |r: VersionRange| r.select(&history).iter().map(|v| v.seq).collect::<Vec<_>>();

        assert_eq!(seqs(VersionRange::all()).len(), 10);
        assert_eq!(seqs(VersionRange::latest(3)), vec![8, 9, 10]);
        assert_eq!(seqs(VersionRange { from: Some(4), limit: Some(2) }), vec![4, 5]);
        assert_eq!(seqs(VersionRange { from: Some(9), limit: None }), vec![9, 10]);
        assert!(seqs(VersionRange { from: Some(11), limit: Some(5) }).is_empty());
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Editor".parse::<Role>(), Ok(Role::Editor));
        assert!("admin".parse::<Role>().is_err());
    }
}

//! Per-user conversation sessions.
//!
//! The store is the only place conversation data lives between messages.
//! Entries are keyed by the transport's user id; operations on one key never
//! observe or touch another.

use crate::assembler::AssembledDocument;
use crate::message::AssetRef;
use dashmap::DashMap;

/// Where a user currently is in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    AwaitFilename,
    AwaitFirstPhoto,
    Uploading,
    Mailing,
}

impl ConversationState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitFilename => "await_filename",
            Self::AwaitFirstPhoto => "await_first_photo",
            Self::Uploading => "uploading",
            Self::Mailing => "mailing",
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated state of one user's conversation.
///
/// The file name is fixed once chosen; uploads only grow; the document is
/// stored once, when uploading ends.
#[derive(Debug, Clone)]
pub enum Session {
    AwaitingFileName,
    Uploading {
        file_name: String,
        assets: Vec<AssetRef>,
    },
    Mailing {
        file_name: String,
        document: AssembledDocument,
    },
}

impl Session {
    pub fn state(&self) -> ConversationState {
        match self {
            Self::AwaitingFileName => ConversationState::AwaitFilename,
            Self::Uploading { assets, .. } if assets.is_empty() => {
                ConversationState::AwaitFirstPhoto
            }
            Self::Uploading { .. } => ConversationState::Uploading,
            Self::Mailing { .. } => ConversationState::Mailing,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::AwaitingFileName => None,
            Self::Uploading { file_name, .. } | Self::Mailing { file_name, .. } => Some(file_name),
        }
    }

    pub fn assets(&self) -> &[AssetRef] {
        match self {
            Self::Uploading { assets, .. } => assets,
            _ => &[],
        }
    }

    pub fn document(&self) -> Option<&AssembledDocument> {
        match self {
            Self::Mailing { document, .. } => Some(document),
            _ => None,
        }
    }
}

/// Process-wide mapping from user id to session.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh session, discarding whatever the user had before.
    ///
    /// Returns `true` when an earlier session was replaced.
    pub fn begin(&self, user_id: &str) -> bool {
        self.sessions
            .insert(user_id.to_string(), Session::AwaitingFileName)
            .is_some()
    }

    /// Snapshot of the user's session.
    pub fn get(&self, user_id: &str) -> Option<Session> {
        self.sessions.get(user_id).map(|s| s.value().clone())
    }

    pub fn state(&self, user_id: &str) -> Option<ConversationState> {
        self.sessions.get(user_id).map(|s| s.state())
    }

    /// Overwrite the user's session.
    pub fn replace(&self, user_id: &str, session: Session) {
        self.sessions.insert(user_id.to_string(), session);
    }

    /// Append an upload. Only valid while uploading.
    ///
    /// Returns the new upload count, or `None` when the user is not in the
    /// upload phase.
    pub fn push_asset(&self, user_id: &str, asset: AssetRef) -> Option<usize> {
        let mut entry = self.sessions.get_mut(user_id)?;
        match entry.value_mut() {
            Session::Uploading { assets, .. } => {
                assets.push(asset);
                Some(assets.len())
            }
            _ => None,
        }
    }

    /// Delete the user's session. Returns the removed session, if any.
    pub fn remove(&self, user_id: &str) -> Option<Session> {
        self.sessions.remove(user_id).map(|(_, s)| s)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Number of users with a live session.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploading(name: &str) -> Session {
        Session::Uploading {
            file_name: name.into(),
            assets: Vec::new(),
        }
    }

    #[test]
    fn begin_discards_previous_session() {
        let store = SessionStore::new();
        assert!(!store.begin("u1"));
        store.replace("u1", uploading("trip"));
        store.push_asset("u1", AssetRef::new("a"));

        assert!(store.begin("u1"));
        let session = store.get("u1").unwrap();
        assert_eq!(session.state(), ConversationState::AwaitFilename);
        assert!(session.assets().is_empty());
    }

    #[test]
    fn states_follow_session_shape() {
        let store = SessionStore::new();
        store.begin("u1");
        assert_eq!(store.state("u1"), Some(ConversationState::AwaitFilename));

        store.replace("u1", uploading("trip"));
        assert_eq!(store.state("u1"), Some(ConversationState::AwaitFirstPhoto));

        assert_eq!(store.push_asset("u1", AssetRef::new("a")), Some(1));
        assert_eq!(store.state("u1"), Some(ConversationState::Uploading));
        assert_eq!(store.get("u1").unwrap().file_name(), Some("trip"));
    }

    #[test]
    fn push_asset_keeps_order_and_duplicates() {
        let store = SessionStore::new();
        store.replace("u1", uploading("trip"));
        store.push_asset("u1", AssetRef::new("b"));
        store.push_asset("u1", AssetRef::new("a"));
        store.push_asset("u1", AssetRef::new("b"));

        let ids: Vec<_> = store
            .get("u1")
            .unwrap()
            .assets()
            .iter()
            .map(|a| a.file_id.clone())
            .collect();
        assert_eq!(ids, vec!["b", "a", "b"]);
    }

    #[test]
    fn push_asset_outside_upload_phase() {
        let store = SessionStore::new();
        assert_eq!(store.push_asset("nobody", AssetRef::new("a")), None);
        store.begin("u1");
        assert_eq!(store.push_asset("u1", AssetRef::new("a")), None);
    }

    #[test]
    fn users_are_isolated() {
        let store = SessionStore::new();
        store.replace("u1", uploading("one"));
        store.replace("u2", uploading("two"));
        store.push_asset("u1", AssetRef::new("a"));

        assert_eq!(store.get("u1").unwrap().assets().len(), 1);
        assert!(store.get("u2").unwrap().assets().is_empty());

        store.remove("u1");
        assert!(!store.contains("u1"));
        assert_eq!(store.get("u2").unwrap().file_name(), Some("two"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_is_single_shot() {
        let store = SessionStore::new();
        store.begin("u1");
        assert!(store.remove("u1").is_some());
        assert!(store.remove("u1").is_none());
        assert!(store.is_empty());
    }
}

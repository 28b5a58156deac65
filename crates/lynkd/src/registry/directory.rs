//! Identity directory - maps logical users to live transport connections.

use std::collections::HashMap;

use lynk_core::{ConnectionId, UserId};

/// In-memory map from user id to the current transport connection id.
///
/// One active connection per user: a reconnect (register for a user that is
/// already present) overwrites the previous association, last write wins.
/// A reverse index keeps disconnect cleanup O(1).
#[derive(Debug, Default)]
pub struct IdentityDirectory {
    by_user: HashMap<UserId, ConnectionId>,
    by_connection: HashMap<ConnectionId, UserId>,
}

impl IdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `user_id` with `connection_id`, overwriting any prior
    /// association for that user. Idempotent; no error conditions.
    ///
    /// Returns the connection id that was displaced, if any.
    pub fn register(
        &mut self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Option<ConnectionId> {
        // A connection re-identifying as a different user releases its old
        // identity first, so the reverse index never holds a stale pair.
        if let Some(previous_user) = self.by_connection.get(&connection_id) {
            if *previous_user != user_id {
                let previous_user = previous_user.clone();
                self.by_user.remove(&previous_user);
            }
        }

        let displaced = self
            .by_user
            .insert(user_id.clone(), connection_id.clone())
            .filter(|old| *old != connection_id);
        if let Some(ref old_conn) = displaced {
            self.by_connection.remove(old_conn);
        }
        self.by_connection.insert(connection_id, user_id);

        displaced
    }

    /// Pure lookup: the live connection for `user_id`, if any.
    pub fn resolve(&self, user_id: &UserId) -> Option<&ConnectionId> {
        self.by_user.get(user_id)
    }

    /// Removes whichever user currently maps to `connection_id`.
    ///
    /// Used on disconnect. No-op if the connection is unknown (the user may
    /// have re-registered from a newer connection in the meantime).
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<UserId> {
        let user_id = self.by_connection.remove(connection_id)?;
        // Only drop the forward mapping if it still points at this
        // connection; a newer registration must survive the old socket's
        // teardown.
        if self.by_user.get(&user_id) == Some(connection_id) {
            self.by_user.remove(&user_id);
        }
        Some(user_id)
    }

    /// Reverse lookup: the user identified on `connection_id`, if any.
    pub fn user_for(&self, connection_id: &ConnectionId) -> Option<&UserId> {
        self.by_connection.get(connection_id)
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id)
    }

    #[test]
    fn test_register_and_resolve() {
        let mut dir = IdentityDirectory::new();
        dir.register(user("u1"), conn("c1"));

        assert_eq!(dir.resolve(&user("u1")), Some(&conn("c1")));
        assert_eq!(dir.resolve(&user("u2")), None);
    }

    #[test]
    fn test_last_write_wins_on_reconnect() {
        let mut dir = IdentityDirectory::new();
        dir.register(user("u1"), conn("c1"));
        let displaced = dir.register(user("u1"), conn("c2"));

        assert_eq!(displaced, Some(conn("c1")));
        assert_eq!(dir.resolve(&user("u1")), Some(&conn("c2")));
        // The displaced connection no longer identifies anyone.
        assert_eq!(dir.user_for(&conn("c1")), None);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut dir = IdentityDirectory::new();
        dir.register(user("u1"), conn("c1"));
        dir.register(user("u1"), conn("c1"));

        assert_eq!(dir.len(), 1);
        assert_eq!(dir.resolve(&user("u1")), Some(&conn("c1")));
    }

    #[test]
    fn test_unregister_by_connection() {
        let mut dir = IdentityDirectory::new();
        dir.register(user("u1"), conn("c1"));

        let removed = dir.unregister(&conn("c1"));

        assert_eq!(removed, Some(user("u1")));
        assert_eq!(dir.resolve(&user("u1")), None);
        assert!(dir.is_empty());
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut dir = IdentityDirectory::new();
        dir.register(user("u1"), conn("c1"));

        assert_eq!(dir.unregister(&conn("c9")), None);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_stale_disconnect_does_not_evict_newer_registration() {
        let mut dir = IdentityDirectory::new();
        dir.register(user("u1"), conn("c1"));
        // Browser refresh: the new socket registers before the old one closes.
        dir.register(user("u1"), conn("c2"));

        let removed = dir.unregister(&conn("c1"));

        assert_eq!(removed, None, "old connection was already displaced");
        assert_eq!(dir.resolve(&user("u1")), Some(&conn("c2")));
    }

    #[test]
    fn test_connection_reidentifying_releases_old_user() {
        let mut dir = IdentityDirectory::new();
        dir.register(user("u1"), conn("c1"));
        dir.register(user("u2"), conn("c1"));

        assert_eq!(dir.resolve(&user("u1")), None);
        assert_eq!(dir.resolve(&user("u2")), Some(&conn("c1")));
        assert_eq!(dir.user_for(&conn("c1")), Some(&user("u2")));
    }
}

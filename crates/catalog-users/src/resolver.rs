use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use catalog_core::types::ChatId;
use tracing::{debug, info};

use crate::error::Result;
use crate::identity::{create_user, find_user_by_chat_id, get_user};
use crate::types::User;

/// Maximum number of `chat_id` → `user_id` pairs kept in the in-process cache.
/// Simple eviction: when full, drop the oldest half.
const CACHE_MAX: usize = 1024;

/// Result of resolving a `chat_id`.
#[derive(Debug)]
pub enum ResolvedUser {
    Known(User),
    /// Auto-created on first contact (`spec.md` §3 User: "created on first inbound message").
    NewlyCreated(User),
}

impl ResolvedUser {
    pub fn user(&self) -> &User {
        match self {
            ResolvedUser::Known(u) => u,
            ResolvedUser::NewlyCreated(u) => u,
        }
    }

    pub fn into_user(self) -> User {
        match self {
            ResolvedUser::Known(u) => u,
            ResolvedUser::NewlyCreated(u) => u,
        }
    }
}

/// Translates a `chat_id` into a first-class user row, auto-creating one on
/// first contact. Every inbound message calls `resolve()`; the in-memory
/// cache avoids a DB round-trip for known users on the hot path.
pub struct UserResolver {
    db: Arc<Mutex<rusqlite::Connection>>,
    cache: Mutex<HashMap<String, String>>,
    cache_order: Mutex<Vec<String>>,
}

impl UserResolver {
    pub fn new(db: Arc<Mutex<rusqlite::Connection>>) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
            cache_order: Mutex::new(Vec::new()),
        }
    }

    pub fn resolve(&self, chat_id: &ChatId) -> Result<ResolvedUser> {
        if let Some(user_id) = self.cache_lookup(chat_id.as_str()) {
            debug!(%chat_id, user_id, "user cache hit");
            let conn = self.db.lock().unwrap();
            if let Some(user) = get_user(&conn, &user_id)? {
                return Ok(ResolvedUser::Known(user));
            }
            self.cache_remove(chat_id.as_str());
        }

        let conn = self.db.lock().unwrap();
        if let Some(user) = find_user_by_chat_id(&conn, chat_id)? {
            self.cache_insert(chat_id.as_str().to_string(), user.id.clone());
            return Ok(ResolvedUser::Known(user));
        }

        info!(%chat_id, "new chat_id; creating user");
        let user = create_user(&conn, chat_id)?;
        self.cache_insert(chat_id.as_str().to_string(), user.id.clone());
        Ok(ResolvedUser::NewlyCreated(user))
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.db.lock().unwrap();
        get_user(&conn, user_id)
    }

    pub fn update_user(&self, user: &User) -> Result<()> {
        let conn = self.db.lock().unwrap();
        crate::identity::update_user(&conn, user)
    }

    fn cache_lookup(&self, key: &str) -> Option<String> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    fn cache_remove(&self, key: &str) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();
        cache.remove(key);
        order.retain(|k| k != key);
    }

    fn cache_insert(&self, key: String, user_id: String) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();

        if let std::collections::hash_map::Entry::Occupied(mut e) = cache.entry(key.clone()) {
            e.insert(user_id);
            return;
        }

        if cache.len() >= CACHE_MAX {
            let evict_count = CACHE_MAX / 2;
            let to_remove: Vec<_> = order.drain(..evict_count).collect();
            for k in to_remove {
                cache.remove(&k);
            }
        }

        order.push(key.clone());
        cache.insert(key, user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn test_db() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[test]
    fn resolve_creates_then_finds() {
        let resolver = UserResolver::new(test_db());
        let chat_id = ChatId::from("tg:12345");

        let first = resolver.resolve(&chat_id).unwrap();
        assert!(matches!(first, ResolvedUser::NewlyCreated(_)));

        let second = resolver.resolve(&chat_id).unwrap();
        assert!(matches!(second, ResolvedUser::Known(_)));
        assert_eq!(first.into_user().id, second.into_user().id);
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::login::Role;
use crate::store::MemoryStore;

/// Who is signed in on a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

/// One browser session
///
/// Holds the signed-in identity (if any) and, when the application runs with
/// session persistence, the session's own consolidated table. Signing out
/// keeps the table.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    identity: Option<Identity>,
    volatile: MemoryStore,
    /// `None` when `now + ttl` is past what `SystemTime` can represent
    expires_at: Option<SystemTime>,
}

impl Session {
    pub fn new(ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            identity: None,
            volatile: MemoryStore::new(),
            expires_at: SystemTime::now().checked_add(ttl),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn sign_in(&mut self, email: impl Into<String>, role: Role) {
        self.identity = Some(Identity {
            email: email.into(),
            role,
        });
    }

    pub fn sign_out(&mut self) {
        self.identity = None;
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= SystemTime::now())
    }

    /// Session-scoped table store
    pub fn volatile(&self) -> &MemoryStore {
        &self.volatile
    }

    pub fn volatile_mut(&mut self) -> &mut MemoryStore {
        &mut self.volatile
    }
}

/// A session shared between the registry and the request working on it
pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug)]
struct Entry {
    expires_at: Option<SystemTime>,
    session: SharedSession,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= SystemTime::now())
    }
}

/// Live sessions by id
///
/// Each session has its own lock, so the registry is only held for lookups
/// and a slow action on one session never blocks another.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<String, Entry>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    /// Start a session and return its id
    pub fn create(&mut self) -> String {
        self.prune_expired();
        let session = Session::new(self.ttl);
        let id = session.id.clone();
        let entry = Entry {
            expires_at: session.expires_at,
            session: Arc::new(Mutex::new(session)),
        };
        self.sessions.insert(id.clone(), entry);
        id
    }

    /// Look up a live session; an expired one is dropped and reported absent
    pub fn get(&mut self, id: &str) -> Option<SharedSession> {
        if self.sessions.get(id).is_some_and(Entry::is_expired) {
            self.sessions.remove(id);
            return None;
        }
        self.sessions.get(id).map(|entry| Arc::clone(&entry.session))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn prune_expired(&mut self) {
        self.sessions.retain(|_, entry| !entry.is_expired());
    }
}

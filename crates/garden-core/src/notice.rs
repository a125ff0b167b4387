//! User-visible notices.
//!
//! Successful sends post a transient notice that disappears on its own;
//! failures and unavailability post persistent notices that stay until
//! dismissed. Expiry uses [`tokio::time::Instant`], so tests can drive it with
//! a paused clock.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Default lifetime of a transient notice.
pub const DEFAULT_TRANSIENT_TTL: Duration = Duration::from_secs(4);

/// How a notice should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    /// Acknowledgment of a successful action.
    Success,
    /// Something the user should act on.
    Warning,
    /// A failed action.
    Error,
    /// A feature is unavailable for the rest of the session.
    Unavailable,
}

/// A single notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub message: String,
    /// `None` for persistent notices.
    pub expires_at: Option<Instant>,
}

impl Notice {
    /// Whether the notice dismisses itself.
    pub fn is_transient(&self) -> bool {
        self.expires_at.is_some()
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    items: Vec<Notice>,
}

/// The notice board for one session.
#[derive(Debug, Default)]
pub struct Notices {
    inner: Mutex<Inner>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a notice that expires after `ttl`.
    pub fn post_transient(&self, level: NoticeLevel, message: impl Into<String>, ttl: Duration) -> u64 {
        self.push(level, message.into(), Some(Instant::now() + ttl))
    }

    /// Post a notice that stays until dismissed.
    pub fn post_persistent(&self, level: NoticeLevel, message: impl Into<String>) -> u64 {
        self.push(level, message.into(), None)
    }

    fn push(&self, level: NoticeLevel, message: String, expires_at: Option<Instant>) -> u64 {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.items.push(Notice {
            id,
            level,
            message,
            expires_at,
        });
        id
    }

    /// Notices still showing, oldest first. Expired ones are dropped.
    pub fn active(&self) -> Vec<Notice> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.items.retain(|notice| !notice.is_expired(now));
        inner.items.clone()
    }

    /// Remove a notice. Returns whether it was showing.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let before = inner.items.len();
        inner.items.retain(|notice| notice.id != id);
        inner.items.len() != before
    }

    /// Remove every notice of the given level.
    pub fn dismiss_level(&self, level: NoticeLevel) {
        self.lock().items.retain(|notice| notice.level != level);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned board only ever holds complete notices
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

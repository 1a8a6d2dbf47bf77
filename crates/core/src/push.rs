//! Push-invalidation channel
//!
//! The source system posts `{kind, record, recordId, timestamp}` whenever a
//! record changes. Notifications are authenticated with a shared secret and
//! routed to [`EntityCache::upsert`] (record attached) or
//! [`EntityCache::invalidate`] (id only).

use recordcache_domain::{EntityKind, PushNotification, RecordCacheError, Result};
use tracing::{debug, instrument, warn};

use crate::cache::EntityCache;

/// What a notification did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Upserted,
    Invalidated,
}

/// Authenticates and applies push notifications.
pub struct PushHandler {
    cache: EntityCache,
    shared_secret: Option<String>,
}

impl PushHandler {
    /// `shared_secret` of `None` rejects every notification.
    pub fn new(cache: EntityCache, shared_secret: Option<String>) -> Self {
        Self { cache, shared_secret }
    }

    /// Apply one notification.
    ///
    /// # Errors
    /// `Auth` when the secret does not match (or none is configured), and
    /// `InvalidInput` when the attached record carries no usable id.
    #[instrument(skip(self, secret, notification), fields(kind = %notification.kind, record_id = %notification.record_id))]
    pub async fn handle(&self, secret: &str, notification: PushNotification) -> Result<PushOutcome> {
        self.authenticate(secret)?;
        self.apply(notification).await
    }

    /// Parse a JSON body and apply it.
    ///
    /// # Errors
    /// As [`Self::handle`], plus `InvalidInput` for a malformed body. The
    /// secret is checked before the body is parsed.
    pub async fn handle_json(&self, secret: &str, body: &[u8]) -> Result<PushOutcome> {
        self.authenticate(secret)?;
        let notification: PushNotification = serde_json::from_slice(body)
            .map_err(|err| RecordCacheError::InvalidInput(format!("malformed notification: {err}")))?;
        self.apply(notification).await
    }

    async fn apply(&self, notification: PushNotification) -> Result<PushOutcome> {
        let kind: EntityKind = notification.kind;
        let record_id = notification.record_id.clone();
        match notification.into_record() {
            Some(record) => {
                self.cache.upsert(kind, record.into_payload()).await?;
                debug!(%kind, record_id, "push upsert applied");
                Ok(PushOutcome::Upserted)
            }
            None => {
                self.cache.invalidate(kind, &record_id).await;
                debug!(%kind, record_id, "push invalidation applied");
                Ok(PushOutcome::Invalidated)
            }
        }
    }

    fn authenticate(&self, secret: &str) -> Result<()> {
        let Some(expected) = self.shared_secret.as_deref() else {
            warn!("push notification rejected, no shared secret configured");
            return Err(RecordCacheError::Auth("push channel is disabled".into()));
        };
        if constant_time_eq(expected.as_bytes(), secret.as_bytes()) {
            Ok(())
        } else {
            warn!("push notification rejected, shared secret mismatch");
            Err(RecordCacheError::Auth("invalid shared secret".into()))
        }
    }
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

//! Append-only, bounded, persisted record of every request/response
//! exchanged with the backend.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CheckoutError, Result};
use crate::storage::{StorageAdapter, keys};

/// Maximum number of retained entries; the oldest is evicted beyond this.
pub const MAX_HISTORY: usize = 20;

/// Backend operation identifiers, one per remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiOperation {
    #[serde(rename = "AUTH001")]
    Authenticate,
    #[serde(rename = "APPROVE001")]
    Approve,
    #[serde(rename = "DEPOSIT001")]
    ConfirmDeposit,
    #[serde(rename = "CANCEL001")]
    CancelAll,
    #[serde(rename = "CANCEL002")]
    CancelPartial,
    #[serde(rename = "TOKEN001")]
    TokenList,
    #[serde(rename = "TOKEN002")]
    TokenRegister,
    #[serde(rename = "TOKEN004")]
    TokenDelete,
    #[serde(rename = "TOKEN005")]
    TokenVerifyPassword,
    #[serde(rename = "TOKEN_PAY001")]
    TokenPay,
}

impl ApiOperation {
    pub fn id(&self) -> &'static str {
        match self {
            ApiOperation::Authenticate => "AUTH001",
            ApiOperation::Approve => "APPROVE001",
            ApiOperation::ConfirmDeposit => "DEPOSIT001",
            ApiOperation::CancelAll => "CANCEL001",
            ApiOperation::CancelPartial => "CANCEL002",
            ApiOperation::TokenList => "TOKEN001",
            ApiOperation::TokenRegister => "TOKEN002",
            ApiOperation::TokenDelete => "TOKEN004",
            ApiOperation::TokenVerifyPassword => "TOKEN005",
            ApiOperation::TokenPay => "TOKEN_PAY001",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApiOperation::Authenticate => "payment authentication",
            ApiOperation::Approve => "payment approval",
            ApiOperation::ConfirmDeposit => "deposit confirmation",
            ApiOperation::CancelAll => "full cancellation",
            ApiOperation::CancelPartial => "partial cancellation",
            ApiOperation::TokenList => "token list",
            ApiOperation::TokenRegister => "token registration",
            ApiOperation::TokenDelete => "token deletion",
            ApiOperation::TokenVerifyPassword => "token password verification",
            ApiOperation::TokenPay => "token payment",
        }
    }
}

impl std::fmt::Display for ApiOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// One recorded exchange, request and response captured verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub no: u64,
    pub operation: ApiOperation,
    pub timestamp: String,
    pub request: Value,
    pub response: Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedHistory {
    counter: u64,
    entries: Vec<AuditEntry>,
}

/// Bounded audit history. Entries are kept most-recent-first; the whole
/// collection plus the running counter is written back to storage after
/// every insert, so sequence numbers survive a restart.
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
    counter: u64,
    storage: Arc<dyn StorageAdapter>,
}

impl AuditLog {
    /// Restore the history from storage. Absent or corrupt data yields an
    /// empty log without raising.
    pub fn load(storage: Arc<dyn StorageAdapter>) -> Self {
        let persisted: PersistedHistory = storage
            .get(keys::AUDIT_HISTORY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        Self {
            counter: persisted.counter.max(persisted.entries.len() as u64),
            entries: persisted.entries.into(),
            storage,
        }
    }

    /// Record one exchange: assign the next sequence number, insert at the
    /// head, evict the tail past [`MAX_HISTORY`], and persist.
    pub fn record(&mut self, operation: ApiOperation, request: Value, response: Value) {
        self.counter += 1;
        self.entries.push_front(AuditEntry {
            no: self.counter,
            operation,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request,
            response,
        });

        if self.entries.len() > MAX_HISTORY {
            self.entries.pop_back();
        }

        tracing::debug!(no = self.counter, operation = %operation, "recorded audit entry");
        self.persist();
    }

    /// Entries, most recent first.
    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Empty the history and the persisted copy. Requires an explicit
    /// confirmation from the caller.
    pub fn clear(&mut self, confirmed: bool) -> Result<()> {
        if !confirmed {
            return Err(CheckoutError::validation(
                "clearing the audit history requires confirmation",
            ));
        }
        self.entries.clear();
        self.counter = 0;
        self.storage.remove(keys::AUDIT_HISTORY);
        Ok(())
    }

    fn persist(&self) {
        let persisted = PersistedHistory {
            counter: self.counter,
            entries: self.entries.iter().cloned().collect(),
        };
        match serde_json::to_string(&persisted) {
            Ok(raw) => self.storage.set(keys::AUDIT_HISTORY, &raw),
            Err(e) => tracing::warn!("failed to serialize audit history: {e}"),
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("counter", &self.counter)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn log() -> (Arc<MemoryStorage>, AuditLog) {
        let storage = Arc::new(MemoryStorage::new());
        let log = AuditLog::load(storage.clone());
        (storage, log)
    }

    #[test]
    fn record_inserts_newest_first() {
        let (_, mut log) = log();
        log.record(ApiOperation::Authenticate, json!({"a": 1}), json!({}));
        log.record(ApiOperation::Approve, json!({"b": 2}), json!({}));

        let entries: Vec<_> = log.entries().collect();
        assert_eq!(entries[0].operation, ApiOperation::Approve);
        assert_eq!(entries[0].no, 2);
        assert_eq!(entries[1].operation, ApiOperation::Authenticate);
        assert_eq!(entries[1].no, 1);
    }

    #[test]
    fn history_is_bounded_and_evicts_oldest() {
        let (_, mut log) = log();
        for i in 0..(MAX_HISTORY as u64 + 1) {
            log.record(ApiOperation::Authenticate, json!({ "i": i }), json!({}));
        }

        assert_eq!(log.len(), MAX_HISTORY);
        // The entry with the smallest sequence number is gone; the newest is first.
        assert!(log.entries().all(|e| e.no != 1));
        assert_eq!(log.entries().next().unwrap().no, MAX_HISTORY as u64 + 1);
    }

    #[test]
    fn counter_survives_reload() {
        let (storage, mut log) = log();
        log.record(ApiOperation::Authenticate, json!({}), json!({}));
        log.record(ApiOperation::Approve, json!({}), json!({}));

        let mut reloaded = AuditLog::load(storage);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.counter(), 2);

        reloaded.record(ApiOperation::CancelAll, json!({}), json!({}));
        assert_eq!(reloaded.entries().next().unwrap().no, 3);
    }

    #[test]
    fn corrupt_storage_yields_empty_log() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(keys::AUDIT_HISTORY, "{not json");

        let log = AuditLog::load(storage);
        assert!(log.is_empty());
        assert_eq!(log.counter(), 0);
    }

    #[test]
    fn clear_requires_confirmation() {
        let (storage, mut log) = log();
        log.record(ApiOperation::Authenticate, json!({}), json!({}));

        assert!(log.clear(false).is_err());
        assert_eq!(log.len(), 1);

        log.clear(true).unwrap();
        assert!(log.is_empty());
        assert!(storage.get(keys::AUDIT_HISTORY).is_none());
    }

    #[test]
    fn operation_ids_match_catalogue() {
        assert_eq!(ApiOperation::Authenticate.id(), "AUTH001");
        assert_eq!(ApiOperation::CancelPartial.id(), "CANCEL002");
        assert_eq!(ApiOperation::TokenPay.id(), "TOKEN_PAY001");
        assert_eq!(
            serde_json::to_value(ApiOperation::ConfirmDeposit).unwrap(),
            "DEPOSIT001"
        );
    }
}

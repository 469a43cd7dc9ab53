use dashmap::DashMap;
use shared_types::{
    Language, ValidationDecisionKind, ValidationId, ValidationRequest, ValidationStatistics,
    ValidationStatus,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Error surfaced by `submit_decision` when a request is already in a
/// terminal state that does not match the submitted decision (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitDecisionError {
    NotFound,
    Conflict { current: ValidationStatus },
}

struct ValidationSlot {
    request: ValidationRequest,
    status_tx: watch::Sender<ValidationStatus>,
}

/// Queue of pending human validations, with asynchronous resumption and
/// per-entry timeout enforcement (§4.6). Each entry owns a `watch` channel so
/// any number of callers can `await_decision` the same request without
/// polling, and all observe the same terminal outcome.
pub struct HumanLoopManager {
    slots: DashMap<ValidationId, ValidationSlot>,
    default_timeout: Duration,
    approved_count: AtomicU64,
    rejected_count: AtomicU64,
    expired_count: AtomicU64,
    total_wait_ms: AtomicU64,
    resolved_count: AtomicU64,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl HumanLoopManager {
    pub fn new(default_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            slots: DashMap::new(),
            default_timeout,
            approved_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
            total_wait_ms: AtomicU64::new(0),
            resolved_count: AtomicU64::new(0),
        })
    }

    /// Creates a new pending validation and schedules its expiry. Returns
    /// the created request so the caller can surface `validation_id` to the
    /// external client immediately.
    pub fn create(
        self: &Arc<Self>,
        query_fingerprint: String,
        trigger_kind: shared_types::TriggerKind,
        priority: u8,
        draft_response: String,
        detected_language: Language,
        target_language: Language,
    ) -> ValidationRequest {
        let id = Uuid::new_v4();
        let created_at = now_ms();
        let expires_at = created_at + self.default_timeout.as_millis() as u64;

        let request = ValidationRequest {
            id,
            query_fingerprint,
            trigger_kind,
            priority,
            draft_response,
            detected_language,
            target_language,
            created_at_epoch_ms: created_at,
            expires_at_epoch_ms: expires_at,
            status: ValidationStatus::Pending,
            decision: None,
            modified_text: None,
            reviewer_notes: None,
        };

        let (status_tx, _rx) = watch::channel(ValidationStatus::Pending);
        self.slots.insert(
            id,
            ValidationSlot {
                request: request.clone(),
                status_tx,
            },
        );

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(
                expires_at.saturating_sub(now_ms()),
            ))
            .await;
            manager.expire_if_still_pending(id);
        });

        request
    }

    fn expire_if_still_pending(&self, id: ValidationId) {
        if let Some(mut slot) = self.slots.get_mut(&id) {
            if slot.request.status == ValidationStatus::Pending {
                slot.request.status = ValidationStatus::Expired;
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                let _ = slot.status_tx.send(ValidationStatus::Expired);
            }
        }
    }

    /// Eagerly transitions any pending request whose `expires_at` has
    /// already passed. Invariant (§3): no caller may observe a `PENDING`
    /// request past its expiry.
    fn reap_expired_now(&self) {
        let now = now_ms();
        let expired_ids: Vec<ValidationId> = self
            .slots
            .iter()
            .filter(|e| {
                e.request.status == ValidationStatus::Pending && e.request.expires_at_epoch_ms <= now
            })
            .map(|e| e.request.id)
            .collect();
        for id in expired_ids {
            self.expire_if_still_pending(id);
        }
    }

    pub fn submit_decision(
        &self,
        validation_id: ValidationId,
        decision: ValidationDecisionKind,
        modified_text: Option<String>,
        notes: Option<String>,
    ) -> Result<ValidationRequest, SubmitDecisionError> {
        self.reap_expired_now();

        let mut slot = self
            .slots
            .get_mut(&validation_id)
            .ok_or(SubmitDecisionError::NotFound)?;

        let target_status = match decision {
            ValidationDecisionKind::Approved => ValidationStatus::Approved,
            ValidationDecisionKind::Rejected => ValidationStatus::Rejected,
            ValidationDecisionKind::Modified => ValidationStatus::Modified,
        };

        match slot.request.status {
            ValidationStatus::Pending => {
                slot.request.status = target_status;
                slot.request.decision = Some(decision);
                slot.request.modified_text = modified_text;
                slot.request.reviewer_notes = notes;

                match target_status {
                    ValidationStatus::Approved => {
                        self.approved_count.fetch_add(1, Ordering::Relaxed)
                    }
                    ValidationStatus::Rejected => {
                        self.rejected_count.fetch_add(1, Ordering::Relaxed)
                    }
                    _ => 0,
                };
                self.resolved_count.fetch_add(1, Ordering::Relaxed);
                self.total_wait_ms.fetch_add(
                    now_ms().saturating_sub(slot.request.created_at_epoch_ms),
                    Ordering::Relaxed,
                );

                let _ = slot.status_tx.send(target_status);
                Ok(slot.request.clone())
            }
            current if current == target_status => {
                // Idempotent resubmission of the same terminal state (§4.6).
                Ok(slot.request.clone())
            }
            current => Err(SubmitDecisionError::Conflict { current }),
        }
    }

    /// Awaits the terminal status of `validation_id` without polling,
    /// returning `None` if the id is unknown or the wait exceeds `timeout`.
    pub async fn await_decision(
        &self,
        validation_id: ValidationId,
        timeout: Duration,
    ) -> Option<ValidationStatus> {
        let mut rx = {
            let slot = self.slots.get(&validation_id)?;
            slot.status_tx.subscribe()
        };

        if rx.borrow().is_terminal() {
            return Some(*rx.borrow());
        }

        let wait = tokio::time::timeout(timeout, async {
            loop {
                if rx.changed().await.is_err() {
                    return None;
                }
                let status = *rx.borrow();
                if status.is_terminal() {
                    return Some(status);
                }
            }
        })
        .await;

        match wait {
            Ok(status) => status,
            Err(_) => None,
        }
    }

    pub fn get(&self, validation_id: ValidationId) -> Option<ValidationRequest> {
        self.reap_expired_now();
        self.slots.get(&validation_id).map(|s| s.request.clone())
    }

    /// Snapshot ordered by `(priority desc, created_at asc)` (§4.6, §5).
    pub fn get_pending(&self) -> Vec<ValidationRequest> {
        self.reap_expired_now();
        let mut pending: Vec<ValidationRequest> = self
            .slots
            .iter()
            .filter(|e| e.request.status == ValidationStatus::Pending)
            .map(|e| e.request.clone())
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at_epoch_ms.cmp(&b.created_at_epoch_ms))
        });
        pending
    }

    pub fn statistics(&self) -> ValidationStatistics {
        self.reap_expired_now();
        let pending = self
            .slots
            .iter()
            .filter(|e| e.request.status == ValidationStatus::Pending)
            .count();
        let resolved = self.resolved_count.load(Ordering::Relaxed).max(1);
        let avg_wait_ms = if self.resolved_count.load(Ordering::Relaxed) == 0 {
            0
        } else {
            self.total_wait_ms.load(Ordering::Relaxed) / resolved
        };

        ValidationStatistics {
            pending,
            approved: self.approved_count.load(Ordering::Relaxed) as usize,
            rejected: self.rejected_count.load(Ordering::Relaxed) as usize,
            expired: self.expired_count.load(Ordering::Relaxed) as usize,
            avg_wait_ms,
        }
    }
}

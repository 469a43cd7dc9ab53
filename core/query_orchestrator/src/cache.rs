use dashmap::DashMap;
use sha2::{Digest, Sha256};
use shared_types::{CacheEntry, Consensus, FinalResponse, Language, Query};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Stable key for caching and single-flight: hash of the normalized query
/// text, target language, and human-loop flag (§3). Normalization lowercases
/// and collapses whitespace; punctuation is preserved.
pub fn fingerprint(query: &Query) -> String {
    let normalized = normalize_query_text(&query.text);
    let target = query
        .target_language
        .map(Language::code)
        .unwrap_or("NONE");

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0u8]);
    hasher.update(target.as_bytes());
    hasher.update([0u8]);
    hasher.update([query.enable_human_loop as u8]);
    format!("{:x}", hasher.finalize())
}

fn normalize_query_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

enum Slot {
    /// A workflow is in progress for this fingerprint; late arrivals await a
    /// clone of the eventual result instead of starting their own workflow.
    InFlight(broadcast::Sender<Option<FinalResponse>>),
    Ready(CacheEntry),
}

/// Outcome of `acquire_inflight`: either the caller became the owner
/// responsible for computing the result, or another workflow for the same
/// fingerprint is already running and the caller should await its outcome.
pub enum InflightLease {
    Owner,
    Await(broadcast::Receiver<Option<FinalResponse>>),
}

/// Deduplicating, TTL-bounded memo of `FinalResponse`s with at-most-one-
/// in-flight-workflow-per-fingerprint semantics (§4.5).
pub struct ResponseCache {
    slots: DashMap<String, Slot>,
    default_ttl_secs: u64,
}

impl ResponseCache {
    pub fn new(default_ttl_secs: u64) -> Self {
        Self {
            slots: DashMap::new(),
            default_ttl_secs,
        }
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Returns a live entry, evicting it lazily if it has expired.
    pub fn lookup(&self, fp: &str) -> Option<FinalResponse> {
        let found = match self.slots.get(fp) {
            Some(slot) => match &*slot {
                Slot::Ready(entry) if entry.expires_at_epoch_ms > Self::now_ms() => {
                    Some(entry.response.clone())
                }
                Slot::Ready(_) => None,
                Slot::InFlight(_) => return None,
            },
            None => return None,
        };

        if found.is_none() {
            self.slots.remove(fp);
        }
        found
    }

    /// Atomically registers this fingerprint's in-flight workflow, or
    /// returns a receiver that will observe the existing workflow's result.
    pub fn acquire_inflight(self: &Arc<Self>, fp: &str) -> InflightLease {
        if let Some(cached) = self.lookup(fp) {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(Some(cached));
            return InflightLease::Await(rx);
        }

        match self.slots.entry(fp.to_string()) {
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let (tx, _rx) = broadcast::channel(1);
                v.insert(Slot::InFlight(tx));
                InflightLease::Owner
            }
            dashmap::mapref::entry::Entry::Occupied(o) => match o.get() {
                Slot::InFlight(tx) => InflightLease::Await(tx.subscribe()),
                Slot::Ready(entry) => {
                    let (tx, rx) = broadcast::channel(1);
                    let _ = tx.send(Some(entry.response.clone()));
                    InflightLease::Await(rx)
                }
            },
        }
    }

    /// Only `APPROVED`/`REFORMED_APPROVED` responses are cached (§4.5). Any
    /// other terminal consensus just releases the in-flight slot so waiters
    /// observe the (uncached) result via the broadcast channel.
    pub fn complete(&self, fp: &str, response: FinalResponse) {
        let waiters = match self.slots.get(fp) {
            Some(slot) => match &*slot {
                Slot::InFlight(tx) => tx.clone(),
                Slot::Ready(_) => return,
            },
            None => {
                let (tx, _rx) = broadcast::channel(1);
                tx
            }
        };

        let cacheable = matches!(
            response.consensus,
            Consensus::Approved | Consensus::ReformedApproved
        );

        let _ = waiters.send(Some(response.clone()));

        if cacheable {
            let entry = CacheEntry {
                fingerprint: fp.to_string(),
                response,
                expires_at_epoch_ms: Self::now_ms() + self.default_ttl_secs * 1000,
            };
            self.slots.insert(fp.to_string(), Slot::Ready(entry));
        } else {
            self.slots.remove(fp);
        }
    }

    /// Releases the in-flight slot without caching, e.g. on workflow error.
    /// Waiters are still woken with the failure response via `complete`;
    /// this is only used when a workflow cannot produce any response at all.
    pub fn abandon(&self, fp: &str) {
        if let Some((_, Slot::InFlight(tx))) = self.slots.remove(fp) {
            let _ = tx.send(None);
        }
    }

    /// Background sweep removing expired entries; lookups already evict
    /// lazily, this additionally bounds unbounded growth from keys that are
    /// never looked up again (§4.5).
    pub fn reap_expired(&self) {
        let now = Self::now_ms();
        self.slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => entry.expires_at_epoch_ms > now,
            Slot::InFlight(_) => true,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Consensus, Language, RequestId};
    use uuid::Uuid;

    fn query(text: &str, target: Option<Language>, human_loop: bool) -> Query {
        Query {
            request_id: RequestId::new_v4(),
            text: text.to_string(),
            target_language: target,
            enable_human_loop: human_loop,
        }
    }

    fn response(consensus: Consensus) -> FinalResponse {
        FinalResponse {
            success: true,
            answer: "Paracetamol is an analgesic.".into(),
            sources: vec![],
            detected_language: Language::En,
            target_language: Language::En,
            consensus,
            iterations_used: 1,
            processing_time_ms: 10,
            validation_id: None,
            untranslated: false,
            error: None,
        }
    }

    #[test]
    fn fingerprint_normalizes_whitespace_and_case() {
        let a = query("What   is  Paracetamol?", Some(Language::En), true);
        let b = query("what is paracetamol?", Some(Language::En), true);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_on_enable_human_loop() {
        let a = query("q", None, true);
        let b = query("q", None, false);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn only_approved_consensus_is_cached() {
        let cache = ResponseCache::new(3600);
        cache.complete("fp1", response(Consensus::Fallback));
        assert!(cache.lookup("fp1").is_none());

        cache.complete("fp2", response(Consensus::Approved));
        assert!(cache.lookup("fp2").is_some());
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = ResponseCache::new(0);
        cache.complete("fp", response(Consensus::Approved));
        // TTL of 0 means expires_at == now, so a subsequent lookup at a
        // later instant must miss.
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(cache.lookup("fp").is_none());
    }

    #[tokio::test]
    async fn single_flight_second_caller_awaits_first_result() {
        let cache = Arc::new(ResponseCache::new(3600));
        let fp = "shared-fp";

        let first = cache.acquire_inflight(fp);
        assert!(matches!(first, InflightLease::Owner));

        let second = cache.acquire_inflight(fp);
        let mut rx = match second {
            InflightLease::Await(rx) => rx,
            InflightLease::Owner => panic!("second caller should not own the workflow"),
        };

        cache.complete(fp, response(Consensus::Approved));
        let observed = rx.recv().await.unwrap();
        assert!(observed.is_some());
        assert_eq!(observed.unwrap().answer, "Paracetamol is an analgesic.");
    }
}

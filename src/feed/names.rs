use std::collections::HashSet;

use indexmap::IndexSet;
use moka::sync::Cache;

pub use crate::api::search::NameKind;
use crate::types::Millis;

/// Process-wide id → label cache.
///
/// Unbounded and never invalidated: labels only grow for the lifetime of the
/// process. Clones share the same storage, so a cache built once can be handed
/// to every session (guild switches keep it).
#[derive(Clone)]
pub struct NameCache {
    inner: Cache<(NameKind, String), String>,
}

impl Default for NameCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NameCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().build(),
        }
    }

    pub fn get(&self, kind: NameKind, id: &str) -> Option<String> {
        self.inner.get(&(kind, id.to_owned()))
    }

    pub fn contains(&self, kind: NameKind, id: &str) -> bool {
        self.inner.contains_key(&(kind, id.to_owned()))
    }

    /// Idempotent: writing the same id again replaces the label.
    pub fn insert(&self, kind: NameKind, id: &str, label: String) {
        self.inner.insert((kind, id.to_owned()), label);
    }
}

/// A lookup ready to be sent: at most `batch_cap` ids of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameBatch {
    pub kind: NameKind,
    pub ids: Vec<String>,
}

#[derive(Debug, Default)]
struct KindQueue {
    pending: IndexSet<String>,
    in_flight: HashSet<String>,
    /// Ids the backend did not know. Not re-requested this session.
    missing: HashSet<String>,
    deadline: Option<Millis>,
}

impl KindQueue {
    fn knows(&self, id: &str) -> bool {
        self.pending.contains(id) || self.in_flight.contains(id) || self.missing.contains(id)
    }
}

/// Request-coalescing queue in front of [`NameCache`].
///
/// Render passes call [`observe`](Self::observe) for every id they could not
/// label; the driver calls [`take_due`](Self::take_due) when
/// [`next_deadline`](Self::next_deadline) passes and sends the returned
/// batches. Each kind has at most one batch in flight.
pub struct NameResolver {
    cache: NameCache,
    members: KindQueue,
    channels: KindQueue,
    debounce_ms: Millis,
    batch_cap: usize,
}

impl NameResolver {
    pub fn new(cache: NameCache, debounce_ms: Millis, batch_cap: usize) -> Self {
        Self {
            cache,
            members: KindQueue::default(),
            channels: KindQueue::default(),
            debounce_ms,
            batch_cap: batch_cap.max(1),
        }
    }

    pub fn cache(&self) -> &NameCache {
        &self.cache
    }

    fn queue(&self, kind: NameKind) -> &KindQueue {
        match kind {
            NameKind::Member => &self.members,
            NameKind::Channel => &self.channels,
        }
    }

    fn queue_mut(&mut self, kind: NameKind) -> &mut KindQueue {
        match kind {
            NameKind::Member => &mut self.members,
            NameKind::Channel => &mut self.channels,
        }
    }

    pub fn label(&self, kind: NameKind, id: &str) -> Option<String> {
        self.cache.get(kind, id)
    }

    /// Record a label the backend embedded in an event.
    pub fn seed(&self, kind: NameKind, id: &str, label: String) {
        if !self.cache.contains(kind, id) {
            self.cache.insert(kind, id, label);
        }
    }

    /// Note that `id` was rendered without a label. Returns whether it was
    /// newly queued; cached, queued, in-flight and unknown ids are ignored.
    pub fn observe(&mut self, kind: NameKind, id: &str, now: Millis) -> bool {
        if id.is_empty() || self.cache.contains(kind, id) || self.queue(kind).knows(id) {
            return false;
        }
        let debounce = self.debounce_ms;
        let queue = self.queue_mut(kind);
        queue.pending.insert(id.to_owned());
        // Trailing debounce: every new id pushes the lookup back.
        queue.deadline = Some(now + debounce);
        true
    }

    /// Earliest debounce deadline among kinds that could send now. A kind
    /// with a batch in flight waits for its reply instead.
    pub fn next_deadline(&self) -> Option<Millis> {
        [&self.members, &self.channels]
            .into_iter()
            .filter(|q| q.in_flight.is_empty())
            .filter_map(|q| q.deadline)
            .min()
    }

    /// Batches whose debounce elapsed and whose kind has nothing in flight.
    pub fn take_due(&mut self, now: Millis) -> Vec<NameBatch> {
        let debounce = self.debounce_ms;
        let cap = self.batch_cap;
        let mut batches = Vec::new();
        for kind in [NameKind::Member, NameKind::Channel] {
            let queue = self.queue_mut(kind);
            let due = queue.deadline.is_some_and(|d| d <= now);
            if !due || !queue.in_flight.is_empty() {
                continue;
            }
            if queue.pending.is_empty() {
                queue.deadline = None;
                continue;
            }
            let n = cap.min(queue.pending.len());
            let ids: Vec<String> = queue.pending.drain(..n).collect();
            queue.in_flight.extend(ids.iter().cloned());
            queue.deadline = (!queue.pending.is_empty()).then_some(now + debounce);
            batches.push(NameBatch { kind, ids });
        }
        batches
    }

    /// Store a lookup's results. Returns the labels to patch into the view.
    pub fn complete(
        &mut self,
        kind: NameKind,
        requested: &[String],
        labels: Vec<(String, String)>,
        now: Millis,
    ) -> Vec<(String, String)> {
        for (id, label) in &labels {
            self.cache.insert(kind, id, label.clone());
        }
        let queue = self.queue_mut(kind);
        for id in requested {
            queue.in_flight.remove(id);
            if !labels.iter().any(|(got, _)| got == id) {
                queue.missing.insert(id.clone());
            }
        }
        self.rearm(kind, now);
        labels
    }

    /// A lookup failed. Its ids may be queued again by a later render.
    pub fn fail(&mut self, kind: NameKind, requested: &[String], now: Millis) {
        let queue = self.queue_mut(kind);
        for id in requested {
            queue.in_flight.remove(id);
        }
        self.rearm(kind, now);
    }

    /// Ids queued behind a finished batch keep their deadline, which may
    /// already have passed; an empty queue has none.
    fn rearm(&mut self, kind: NameKind, now: Millis) {
        let debounce = self.debounce_ms;
        let queue = self.queue_mut(kind);
        if !queue.in_flight.is_empty() {
            return;
        }
        queue.deadline = if queue.pending.is_empty() {
            None
        } else {
            Some(queue.deadline.unwrap_or(now + debounce))
        };
    }

    pub fn has_in_flight(&self, kind: NameKind) -> bool {
        !self.queue(kind).in_flight.is_empty()
    }

    /// Nothing queued and nothing in flight.
    pub fn is_idle(&self) -> bool {
        [&self.members, &self.channels]
            .iter()
            .all(|q| q.pending.is_empty() && q.in_flight.is_empty())
    }

    /// The replies for in-flight batches will be dropped as stale; put their
    /// ids back in the queue so the next render can ask again.
    pub fn abandon_in_flight(&mut self, now: Millis) {
        let debounce = self.debounce_ms;
        for kind in [NameKind::Member, NameKind::Channel] {
            let queue = self.queue_mut(kind);
            if queue.in_flight.is_empty() {
                continue;
            }
            let ids: Vec<String> = queue.in_flight.drain().collect();
            queue.pending.extend(ids);
            queue.deadline = Some(now + debounce);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> NameResolver {
        NameResolver::new(NameCache::new(), 250, 3)
    }

    #[test]
    fn burst_is_coalesced_into_one_batch() {
        let mut r = resolver();
        assert!(r.observe(NameKind::Member, "U1", 0));
        assert!(r.observe(NameKind::Member, "U2", 100));
        assert!(!r.observe(NameKind::Member, "U1", 120));
        assert!(r.take_due(300).is_empty(), "debounce restarted at 100");
        let batches = r.take_due(350);
        assert_eq!(
            batches,
            vec![NameBatch {
                kind: NameKind::Member,
                ids: vec!["U1".into(), "U2".into()]
            }]
        );
        assert_eq!(r.next_deadline(), None);
    }

    #[test]
    fn batches_are_capped_and_serialized_per_kind() {
        let mut r = resolver();
        for id in ["A", "B", "C", "D", "E"] {
            r.observe(NameKind::Member, id, 0);
        }
        let first = r.take_due(250);
        assert_eq!(first[0].ids, vec!["A", "B", "C"]);
        // Remaining ids wait for the in-flight batch.
        assert!(r.take_due(600).is_empty());
        r.complete(NameKind::Member, &first[0].ids, vec![("A".into(), "alice".into())], 600);
        let second = r.take_due(600);
        assert_eq!(second[0].ids, vec!["D", "E"]);
    }

    #[test]
    fn deadline_waits_for_the_in_flight_batch() {
        let mut r = resolver();
        r.observe(NameKind::Member, "U1", 0);
        let first = r.take_due(250);
        r.observe(NameKind::Member, "U2", 300);
        for now in [600, 1_000, 5_000, 60_000] {
            assert!(r.take_due(now).is_empty());
            assert_eq!(r.next_deadline(), None, "nothing can be sent at {now}");
        }
        r.complete(NameKind::Member, &first[0].ids, vec![], 60_000);
        // U2's debounce elapsed long ago, so it is due at once.
        assert_eq!(r.next_deadline(), Some(550));
        assert_eq!(r.take_due(60_000)[0].ids, vec!["U2"]);
    }

    #[test]
    fn failed_batch_rearms_the_queue_behind_it() {
        let mut r = resolver();
        r.observe(NameKind::Channel, "C1", 0);
        let first = r.take_due(250);
        r.fail(NameKind::Channel, &first[0].ids, 400);
        assert_eq!(r.next_deadline(), None);
        r.observe(NameKind::Channel, "C2", 500);
        assert_eq!(r.next_deadline(), Some(750));
    }

    #[test]
    fn kinds_are_independent() {
        let mut r = resolver();
        r.observe(NameKind::Member, "U1", 0);
        r.observe(NameKind::Channel, "C1", 0);
        let batches = r.take_due(250);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn cached_and_missing_ids_are_never_requeued() {
        let mut r = resolver();
        r.observe(NameKind::Member, "U1", 0);
        r.observe(NameKind::Member, "U2", 0);
        let batch = r.take_due(250).remove(0);
        let patched = r.complete(NameKind::Member, &batch.ids, vec![("U1".into(), "alice".into())], 300);
        assert_eq!(patched, vec![("U1".to_owned(), "alice".to_owned())]);
        assert_eq!(r.label(NameKind::Member, "U1").as_deref(), Some("alice"));
        assert!(!r.observe(NameKind::Member, "U1", 1_000));
        assert!(!r.observe(NameKind::Member, "U2", 1_000));
    }

    #[test]
    fn failed_ids_can_be_requeued() {
        let mut r = resolver();
        r.observe(NameKind::Channel, "C1", 0);
        let batch = r.take_due(250).remove(0);
        r.fail(NameKind::Channel, &batch.ids, 300);
        assert!(!r.has_in_flight(NameKind::Channel));
        assert!(r.observe(NameKind::Channel, "C1", 500));
    }

    #[test]
    fn abandoned_batches_are_requeued() {
        let mut r = resolver();
        r.observe(NameKind::Member, "U1", 0);
        let first = r.take_due(250);
        assert_eq!(first.len(), 1);
        r.abandon_in_flight(300);
        assert!(!r.has_in_flight(NameKind::Member));
        assert_eq!(r.next_deadline(), Some(550));
        let again = r.take_due(550);
        assert_eq!(again[0].ids, vec!["U1"]);
    }

    #[test]
    fn seeded_labels_suppress_lookups() {
        let mut r = resolver();
        r.seed(NameKind::Member, "U7", "bob".into());
        assert!(!r.observe(NameKind::Member, "U7", 0));
        assert!(r.take_due(1_000).is_empty());
    }

    #[test]
    fn cache_is_shared_between_resolvers() {
        let cache = NameCache::new();
        let a = NameResolver::new(cache.clone(), 250, 50);
        a.seed(NameKind::Member, "U1", "alice".into());
        let mut b = NameResolver::new(cache, 250, 50);
        assert!(!b.observe(NameKind::Member, "U1", 0));
    }
}

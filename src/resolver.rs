//! Conflict resolution: the index narrows, the exact predicate decides.
//!
//! The resolver never scans the full item set. A proposed range is first
//! turned into a candidate id set by the bucket index; only the matching
//! events/tasks reach the pairwise overlap predicate, which makes the final
//! call. Correctness therefore rides on the index's no-false-negative
//! guarantee: an item the index never saw — a missed delta, an evicted
//! bucket — is silently excluded from conflict checking. Hosts that cannot
//! track deltas precisely must call [`ConflictResolver::rebuild_from_snapshot`]
//! on every wholesale reload.

use std::time::Instant;

use tracing::debug;

use crate::index::{BucketIndex, IndexConfig, IndexError, IndexStats};
use crate::model::{
    ConflictDetail, ConflictKind, ConflictReport, EventItem, Ms, Schedulable, Span, TaskItem,
};
use crate::observability;

/// The exact pairwise-overlap collaborator.
///
/// Black box to this crate; the single contract is "reports true overlaps
/// only". Receives only the candidate subset the index produced.
pub trait OverlapPredicate {
    fn evaluate(
        &self,
        proposed: Span,
        events: &[&EventItem],
        tasks: &[&TaskItem],
        exclude_id: Option<&str>,
    ) -> ConflictReport;
}

/// Reference predicate: strict half-open interval intersection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactOverlap;

impl OverlapPredicate for ExactOverlap {
    fn evaluate(
        &self,
        proposed: Span,
        events: &[&EventItem],
        tasks: &[&TaskItem],
        exclude_id: Option<&str>,
    ) -> ConflictReport {
        let mut conflicts = Vec::new();
        for event in events {
            if exclude_id == Some(event.id.as_str()) {
                continue;
            }
            if let Some(span) = event.window()
                && span.overlaps(&proposed)
            {
                conflicts.push(ConflictDetail {
                    id: event.id.clone(),
                    title: event.title.clone(),
                    kind: ConflictKind::Event,
                    span,
                });
            }
        }
        for task in tasks {
            if exclude_id == Some(task.id.as_str()) {
                continue;
            }
            if let Some(span) = task.window()
                && span.overlaps(&proposed)
            {
                conflicts.push(ConflictDetail {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    kind: ConflictKind::Task,
                    span,
                });
            }
        }
        ConflictReport { conflicts }
    }
}

/// How the host's item set changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOp {
    Add,
    Remove,
    Update,
}

/// Owns one [`BucketIndex`] plus the overlap predicate. Instantiated once by
/// the host application (or per test) — there is no ambient instance.
pub struct ConflictResolver<P = ExactOverlap> {
    index: BucketIndex,
    predicate: P,
}

impl ConflictResolver<ExactOverlap> {
    pub fn new(config: IndexConfig) -> Result<Self, IndexError> {
        Self::with_predicate(config, ExactOverlap)
    }
}

impl<P: OverlapPredicate> ConflictResolver<P> {
    pub fn with_predicate(config: IndexConfig, predicate: P) -> Result<Self, IndexError> {
        Ok(Self {
            index: BucketIndex::new(config)?,
            predicate,
        })
    }

    pub fn index(&self) -> &BucketIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut BucketIndex {
        &mut self.index
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    /// Check a proposed `[start, end)` range against the known item
    /// collections, consulting the index for candidates first and running
    /// the exact predicate only on those. `exclude_id` drops the item being
    /// edited from consideration. The predicate's answer is returned
    /// unmodified; no independent verification pass happens here.
    pub fn check_conflict(
        &mut self,
        proposed_start: Ms,
        proposed_end: Ms,
        known_events: &[EventItem],
        known_tasks: &[TaskItem],
        exclude_id: Option<&str>,
    ) -> ConflictReport {
        let started = Instant::now();
        metrics::counter!(observability::CONFLICT_CHECKS_TOTAL).increment(1);

        if proposed_end <= proposed_start {
            return ConflictReport::default();
        }
        let proposed = Span::new(proposed_start, proposed_end);

        let candidates = self.index.query_range(proposed_start, proposed_end);
        let events: Vec<&EventItem> = known_events
            .iter()
            .filter(|e| candidates.contains(e.id.as_str()) && exclude_id != Some(e.id.as_str()))
            .collect();
        let tasks: Vec<&TaskItem> = known_tasks
            .iter()
            .filter(|t| candidates.contains(t.id.as_str()) && exclude_id != Some(t.id.as_str()))
            .collect();

        let report = self.predicate.evaluate(proposed, &events, &tasks, exclude_id);
        metrics::histogram!(observability::CONFLICT_CHECK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        report
    }

    /// Clear the index and re-insert every item's window in one pass.
    /// Idempotent: the same snapshot reproduces the same bucket membership
    /// regardless of prior state. Call whenever the resolver's view of
    /// "current items" changes wholesale — the index does not subscribe to
    /// changes on its own.
    pub fn rebuild_from_snapshot(&mut self, events: &[EventItem], tasks: &[TaskItem]) {
        self.index.clear();
        for event in events {
            index_item(&mut self.index, event);
        }
        for task in tasks {
            index_item(&mut self.index, task);
        }
        metrics::counter!(observability::INDEX_REBUILDS_TOTAL).increment(1);
        debug!(
            events = events.len(),
            tasks = tasks.len(),
            buckets = self.index.bucket_count(),
            "rebuilt index from snapshot"
        );
    }

    /// Incremental alternative to a full rebuild. `Update` handles interval
    /// changes by removing then reinserting. A missed delta silently
    /// desynchronizes the index from the true item set, degrading conflict
    /// checking to best effort.
    pub fn apply_delta<S: Schedulable>(&mut self, item: &S, op: DeltaOp) {
        match op {
            DeltaOp::Add => index_item(&mut self.index, item),
            DeltaOp::Remove => self.index.remove(item.item_id()),
            DeltaOp::Update => {
                self.index.remove(item.item_id());
                index_item(&mut self.index, item);
            }
        }
    }
}

fn index_item(index: &mut BucketIndex, item: &impl Schedulable) {
    let window = item.window();
    index.insert(
        item.item_id(),
        window.map(|w| w.start),
        window.map(|w| w.end),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: Ms = 60_000;
    const H: Ms = 3_600_000;

    fn resolver() -> ConflictResolver {
        ConflictResolver::new(IndexConfig::default()).unwrap()
    }

    #[test]
    fn reports_conflict_with_overlapping_event() {
        let mut resolver = resolver();
        let b = EventItem::new("b", 9 * H, 9 * H + 5 * M);
        resolver.rebuild_from_snapshot(std::slice::from_ref(&b), &[]);

        let report =
            resolver.check_conflict(9 * H + 2 * M, 9 * H + 10 * M, std::slice::from_ref(&b), &[], None);
        assert!(report.has_conflict());
        assert!(report.contains("b"));
        assert_eq!(report.conflicts[0].kind, ConflictKind::Event);

        let edited = resolver.check_conflict(
            9 * H + 2 * M,
            9 * H + 10 * M,
            std::slice::from_ref(&b),
            &[],
            Some("b"),
        );
        assert!(!edited.has_conflict());
    }

    #[test]
    fn exclude_drops_only_that_item() {
        let mut resolver = resolver();
        let a = EventItem::new("a", 10 * H, 11 * H);
        let b = EventItem::new("b", 10 * H + 30 * M, 11 * H + 30 * M);
        let events = vec![a, b];
        resolver.rebuild_from_snapshot(&events, &[]);

        let report = resolver.check_conflict(10 * H, 11 * H, &events, &[], Some("a"));
        assert!(!report.contains("a"));
        assert!(report.contains("b"));
    }

    #[test]
    fn reports_conflict_with_scheduled_task() {
        let mut resolver = resolver();
        let t = TaskItem::new("t", 14 * H, 15 * H);
        resolver.rebuild_from_snapshot(&[], std::slice::from_ref(&t));

        let report =
            resolver.check_conflict(14 * H + 30 * M, 16 * H, &[], std::slice::from_ref(&t), None);
        assert!(report.contains("t"));
        assert_eq!(report.conflicts[0].kind, ConflictKind::Task);
        assert_eq!(report.conflicts[0].span, Span::new(14 * H, 15 * H));
    }

    #[test]
    fn unscheduled_items_never_conflict() {
        let mut resolver = resolver();
        let tasks = vec![TaskItem::unscheduled("someday")];
        let events = vec![EventItem {
            id: "draft".into(),
            title: None,
            start: Some(10 * H),
            end: None,
        }];
        resolver.rebuild_from_snapshot(&events, &tasks);

        let report = resolver.check_conflict(0, 24 * H, &events, &tasks, None);
        assert!(!report.has_conflict());
        assert_eq!(resolver.stats().bucket_count, 0);
    }

    #[test]
    fn adjacent_candidate_rejected_by_exact_predicate() {
        // The end-bucket inclusion rule makes an adjacent event a candidate;
        // the exact predicate must still reject it (half-open intervals).
        let mut resolver = resolver();
        let e = EventItem::new("e", 9 * H, 10 * H);
        resolver.rebuild_from_snapshot(std::slice::from_ref(&e), &[]);

        let candidates = resolver.index_mut().query_range(10 * H, 11 * H);
        assert!(candidates.contains("e"));

        let report = resolver.check_conflict(10 * H, 11 * H, std::slice::from_ref(&e), &[], None);
        assert!(!report.has_conflict());
    }

    #[test]
    fn stale_index_silently_excludes_items() {
        // Documented hazard: the resolver runs no verification pass, so an
        // item the index never saw cannot conflict.
        let mut resolver = resolver();
        let ghost = EventItem::new("ghost", 9 * H, 10 * H);

        let report =
            resolver.check_conflict(9 * H, 10 * H, std::slice::from_ref(&ghost), &[], None);
        assert!(!report.has_conflict());

        resolver.apply_delta(&ghost, DeltaOp::Add);
        let report =
            resolver.check_conflict(9 * H, 10 * H, std::slice::from_ref(&ghost), &[], None);
        assert!(report.contains("ghost"));
    }

    /// Predicate that echoes back every item it is handed, overlap or not —
    /// exposes exactly what the resolver let through.
    struct Echo;

    impl OverlapPredicate for Echo {
        fn evaluate(
            &self,
            _proposed: Span,
            events: &[&EventItem],
            tasks: &[&TaskItem],
            _exclude_id: Option<&str>,
        ) -> ConflictReport {
            let mut conflicts = Vec::new();
            for e in events {
                conflicts.push(ConflictDetail {
                    id: e.id.clone(),
                    title: None,
                    kind: ConflictKind::Event,
                    span: e.window().unwrap(),
                });
            }
            for t in tasks {
                conflicts.push(ConflictDetail {
                    id: t.id.clone(),
                    title: None,
                    kind: ConflictKind::Task,
                    span: t.window().unwrap(),
                });
            }
            ConflictReport { conflicts }
        }
    }

    #[test]
    fn predicate_sees_only_index_candidates() {
        let mut resolver =
            ConflictResolver::with_predicate(IndexConfig::default(), Echo).unwrap();
        let near = EventItem::new("near", 10 * H, 11 * H);
        let far = EventItem::new("far", 20 * H, 21 * H);
        let events = vec![near, far];
        resolver.rebuild_from_snapshot(&events, &[]);

        let report = resolver.check_conflict(10 * H, 11 * H, &events, &[], None);
        assert!(report.contains("near"));
        assert!(!report.contains("far"));
    }

    #[test]
    fn apply_delta_tracks_item_lifecycle() {
        let mut resolver = resolver();
        let mut e = EventItem::new("e", 10 * H, 11 * H);
        let events = vec![e.clone()];

        resolver.apply_delta(&e, DeltaOp::Add);
        assert!(resolver.check_conflict(10 * H, 11 * H, &events, &[], None).contains("e"));

        // Move the event; the old slot frees up, the new one conflicts.
        e.start = Some(15 * H);
        e.end = Some(16 * H);
        resolver.apply_delta(&e, DeltaOp::Update);
        let moved = vec![e.clone()];
        assert!(!resolver.check_conflict(10 * H, 11 * H, &moved, &[], None).has_conflict());
        assert!(resolver.check_conflict(15 * H, 16 * H, &moved, &[], None).contains("e"));

        resolver.apply_delta(&e, DeltaOp::Remove);
        assert!(!resolver.check_conflict(15 * H, 16 * H, &moved, &[], None).has_conflict());
    }

    #[test]
    fn degenerate_proposed_range_is_clear() {
        let mut resolver = resolver();
        let events = vec![EventItem::new("e", 10 * H, 11 * H)];
        resolver.rebuild_from_snapshot(&events, &[]);

        assert!(!resolver.check_conflict(10 * H, 10 * H, &events, &[], None).has_conflict());
        assert!(!resolver.check_conflict(11 * H, 10 * H, &events, &[], None).has_conflict());
    }

    #[test]
    fn rebuild_is_deterministic_and_idempotent() {
        let events = vec![
            EventItem::new("a", 9 * H, 10 * H),
            EventItem::new("b", 9 * H + 30 * M, 11 * H),
        ];
        let tasks = vec![TaskItem::new("t", 20 * H, 21 * H)];

        let mut first = resolver();
        first.rebuild_from_snapshot(&events, &tasks);
        let baseline = first.stats();

        // Rebuilding on top of existing state reproduces the same index.
        first.apply_delta(&EventItem::new("junk", 2 * H, 3 * H), DeltaOp::Add);
        first.rebuild_from_snapshot(&events, &tasks);
        assert_eq!(first.stats(), baseline);

        let mut second = resolver();
        second.rebuild_from_snapshot(&events, &tasks);
        assert_eq!(second.stats(), baseline);
        assert!(!second.check_conflict(2 * H, 3 * H, &events, &tasks, None).has_conflict());
    }
}

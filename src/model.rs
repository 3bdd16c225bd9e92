use serde::{Deserialize, Serialize};

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// The item-supplier seam: anything the host planner can schedule.
///
/// The identifier is an opaque string owned by the host; the window is the
/// time range the item occupies, or `None` while the item is unscheduled
/// (unscheduled items are never indexed and never conflict).
pub trait Schedulable {
    fn item_id(&self) -> &str;
    fn window(&self) -> Option<Span>;
}

/// A calendar event as supplied by the host's data-access layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventItem {
    pub id: String,
    pub title: Option<String>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
}

impl EventItem {
    pub fn new(id: impl Into<String>, start: Ms, end: Ms) -> Self {
        Self {
            id: id.into(),
            title: None,
            start: Some(start),
            end: Some(end),
        }
    }
}

impl Schedulable for EventItem {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn window(&self) -> Option<Span> {
        match (self.start, self.end) {
            (Some(s), Some(e)) if s < e => Some(Span::new(s, e)),
            _ => None,
        }
    }
}

/// A task as supplied by the host's data-access layer.
///
/// A task occupies `[scheduled_at, due_at)` once both endpoints exist;
/// until then it has no window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub title: Option<String>,
    pub scheduled_at: Option<Ms>,
    pub due_at: Option<Ms>,
}

impl TaskItem {
    pub fn new(id: impl Into<String>, scheduled_at: Ms, due_at: Ms) -> Self {
        Self {
            id: id.into(),
            title: None,
            scheduled_at: Some(scheduled_at),
            due_at: Some(due_at),
        }
    }

    pub fn unscheduled(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            scheduled_at: None,
            due_at: None,
        }
    }
}

impl Schedulable for TaskItem {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn window(&self) -> Option<Span> {
        match (self.scheduled_at, self.due_at) {
            (Some(s), Some(e)) if s < e => Some(Span::new(s, e)),
            _ => None,
        }
    }
}

// ── Conflict result types ────────────────────────────────────────

/// Which collection a conflicting item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    Event,
    Task,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub id: String,
    pub title: Option<String>,
    pub kind: ConflictKind,
    pub span: Span,
}

/// Structured answer from the overlap predicate. Empty means the proposed
/// range is clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflicts: Vec<ConflictDetail>,
}

impl ConflictReport {
    pub fn has_conflict(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conflicts.iter().any(|c| c.id == id)
    }
}

use serde::{Deserialize, Serialize};
use ulid::Ulid;

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

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// What the authenticated caller is allowed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player,
    Owner,
}

/// The authenticated caller, as resolved by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Ulid, role: Role) -> Self {
        Self { user_id, role }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl AppointmentStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    /// Busy states consume hall time when computing free intervals.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Owner decision on a pending appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// What an entry on a hall's timeline represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Owner-declared availability window: the hall may be booked here.
    Window,
    /// A reservation request and its lifecycle state.
    Appointment {
        user_id: Ulid,
        status: AppointmentStatus,
        checked_in: bool,
    },
}

/// A single entry on a hall's timeline — windows and appointments share one
/// sorted list so overlap scans cover both with a single binary search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Ulid,
    pub span: Span,
    pub kind: EntryKind,
}

impl Entry {
    pub fn is_window(&self) -> bool {
        matches!(self.kind, EntryKind::Window)
    }

    /// Appointments in a busy state block other bookings of the same time.
    pub fn is_busy(&self) -> bool {
        matches!(self.kind, EntryKind::Appointment { status, .. } if status.is_busy())
    }

    pub fn is_approved(&self) -> bool {
        matches!(
            self.kind,
            EntryKind::Appointment {
                status: AppointmentStatus::Approved,
                ..
            }
        )
    }
}

#[derive(Debug, Clone)]
pub struct HallState {
    pub id: Ulid,
    /// None once the owner account has been removed.
    pub owner_id: Option<Ulid>,
    pub name: String,
    pub address: String,
    /// Hourly price in minor currency units.
    pub price_per_hour: u32,
    pub description: Option<String>,
    /// All entries (windows + appointments), sorted by `span.start`.
    pub entries: Vec<Entry>,
}

impl HallState {
    pub fn new(
        id: Ulid,
        owner_id: Option<Ulid>,
        name: String,
        address: String,
        price_per_hour: u32,
        description: Option<String>,
    ) -> Self {
        Self {
            id,
            owner_id,
            name,
            address,
            price_per_hour,
            description,
            entries: Vec::new(),
        }
    }

    pub fn is_owned_by(&self, user_id: Ulid) -> bool {
        self.owner_id == Some(user_id)
    }

    /// Insert entry maintaining sort order by span.start.
    pub fn insert_entry(&mut self, entry: Entry) {
        let pos = self
            .entries
            .binary_search_by_key(&entry.span.start, |e| e.span.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, entry);
    }

    /// Remove entry by id.
    pub fn remove_entry(&mut self, id: Ulid) -> Option<Entry> {
        if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
            Some(self.entries.remove(pos))
        } else {
            None
        }
    }

    pub fn entry(&self, id: Ulid) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Flip an appointment's status in place. Status changes never move the
    /// entry, so sort order is preserved. Returns false for unknown ids and
    /// for windows.
    pub fn set_appointment_status(&mut self, id: Ulid, new_status: AppointmentStatus) -> bool {
        for e in &mut self.entries {
            if e.id == id
                && let EntryKind::Appointment { status, .. } = &mut e.kind
            {
                *status = new_status;
                return true;
            }
        }
        false
    }

    pub fn set_checked_in(&mut self, id: Ulid) -> bool {
        for e in &mut self.entries {
            if e.id == id
                && let EntryKind::Appointment { checked_in, .. } = &mut e.kind
            {
                *checked_in = true;
                return true;
            }
        }
        false
    }

    /// Return only entries whose span overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Entry> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.entries.partition_point(|e| e.span.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    HallCreated {
        id: Ulid,
        owner_id: Option<Ulid>,
        name: String,
        address: String,
        price_per_hour: u32,
        description: Option<String>,
    },
    HallUpdated {
        id: Ulid,
        name: String,
        address: String,
        price_per_hour: u32,
        description: Option<String>,
    },
    /// Owner account removed; the hall stays, unowned.
    HallOwnerReleased {
        id: Ulid,
    },
    HallDeleted {
        id: Ulid,
    },
    WindowAdded {
        id: Ulid,
        hall_id: Ulid,
        span: Span,
    },
    WindowRemoved {
        id: Ulid,
        hall_id: Ulid,
    },
    AppointmentRequested {
        id: Ulid,
        hall_id: Ulid,
        user_id: Ulid,
        span: Span,
    },
    AppointmentApproved {
        id: Ulid,
        hall_id: Ulid,
    },
    AppointmentRejected {
        id: Ulid,
        hall_id: Ulid,
    },
    AppointmentCancelled {
        id: Ulid,
        hall_id: Ulid,
    },
    CheckedIn {
        id: Ulid,
        hall_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HallInfo {
    pub id: Ulid,
    pub owner_id: Option<Ulid>,
    pub name: String,
    pub address: String,
    pub price_per_hour: u32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: Ulid,
    pub hall_id: Ulid,
    pub start: Ms,
    pub end: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentInfo {
    pub id: Ulid,
    pub hall_id: Ulid,
    pub user_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub status: AppointmentStatus,
    pub checked_in: bool,
}

/// One fixed-length bookable chunk. Slots entirely in the past are exposed
/// but flagged unavailable, not hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start: Ms,
    pub end: Ms,
    pub available: bool,
}

/// Output of the free-slot query, consumed verbatim by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeTimes {
    pub free: Vec<Span>,
    pub slots: Vec<Slot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment(start: Ms, end: Ms, status: AppointmentStatus) -> Entry {
        Entry {
            id: Ulid::new(),
            span: Span::new(start, end),
            kind: EntryKind::Appointment {
                user_id: Ulid::new(),
                status,
                checked_in: false,
            },
        }
    }

    fn window(start: Ms, end: Ms) -> Entry {
        Entry {
            id: Ulid::new(),
            span: Span::new(start, end),
            kind: EntryKind::Window,
        }
    }

    fn make_hall() -> HallState {
        HallState::new(
            Ulid::new(),
            Some(Ulid::new()),
            "Arena".into(),
            "Main St 1".into(),
            2500,
            None,
        )
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_contains_span() {
        let outer = Span::new(100, 400);
        let inner = Span::new(150, 300);
        let partial = Span::new(50, 200);
        assert!(outer.contains_span(&inner));
        assert!(outer.contains_span(&outer)); // self-containment
        assert!(!outer.contains_span(&partial));
    }

    #[test]
    fn status_classification() {
        assert!(AppointmentStatus::Pending.is_busy());
        assert!(AppointmentStatus::Approved.is_busy());
        assert!(!AppointmentStatus::Rejected.is_busy());
        assert!(!AppointmentStatus::Cancelled.is_busy());

        assert!(!AppointmentStatus::Pending.is_terminal());
        assert!(!AppointmentStatus::Approved.is_terminal());
        assert!(AppointmentStatus::Rejected.is_terminal());
        assert!(AppointmentStatus::Cancelled.is_terminal());
    }

    #[test]
    fn entry_busy_follows_status() {
        assert!(appointment(0, 100, AppointmentStatus::Pending).is_busy());
        assert!(appointment(0, 100, AppointmentStatus::Approved).is_busy());
        assert!(!appointment(0, 100, AppointmentStatus::Rejected).is_busy());
        assert!(!appointment(0, 100, AppointmentStatus::Cancelled).is_busy());
        assert!(!window(0, 100).is_busy());
        assert!(window(0, 100).is_window());
    }

    #[test]
    fn entry_ordering() {
        let mut hs = make_hall();
        hs.insert_entry(appointment(300, 400, AppointmentStatus::Pending));
        hs.insert_entry(window(100, 200));
        hs.insert_entry(appointment(200, 300, AppointmentStatus::Approved));
        assert_eq!(hs.entries[0].span.start, 100);
        assert_eq!(hs.entries[1].span.start, 200);
        assert_eq!(hs.entries[2].span.start, 300);
    }

    #[test]
    fn entry_remove() {
        let mut hs = make_hall();
        let e = window(100, 200);
        let id = e.id;
        hs.insert_entry(e);
        assert_eq!(hs.entries.len(), 1);
        hs.remove_entry(id);
        assert!(hs.entries.is_empty());
        assert!(hs.remove_entry(id).is_none());
    }

    #[test]
    fn status_flip_in_place() {
        let mut hs = make_hall();
        let e = appointment(100, 200, AppointmentStatus::Pending);
        let id = e.id;
        hs.insert_entry(e);

        assert!(hs.set_appointment_status(id, AppointmentStatus::Approved));
        assert!(hs.entry(id).unwrap().is_approved());

        // Windows never carry a status.
        let w = window(300, 400);
        let wid = w.id;
        hs.insert_entry(w);
        assert!(!hs.set_appointment_status(wid, AppointmentStatus::Approved));
        assert!(!hs.set_checked_in(wid));
    }

    #[test]
    fn checked_in_flip() {
        let mut hs = make_hall();
        let e = appointment(100, 200, AppointmentStatus::Approved);
        let id = e.id;
        hs.insert_entry(e);

        assert!(hs.set_checked_in(id));
        match hs.entry(id).unwrap().kind {
            EntryKind::Appointment { checked_in, .. } => assert!(checked_in),
            _ => unreachable!(),
        }
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut hs = make_hall();
        hs.insert_entry(window(100, 200)); // past
        hs.insert_entry(window(450, 600)); // overlaps
        hs.insert_entry(window(1000, 1100)); // future

        let query = Span::new(500, 800);
        let hits: Vec<_> = hs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // Entry ending exactly at query.start is NOT overlapping (half-open)
        let mut hs = make_hall();
        hs.insert_entry(window(100, 200));
        let hits: Vec<_> = hs.overlapping(&Span::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn overlapping_large_entry_spanning_query() {
        let mut hs = make_hall();
        hs.insert_entry(window(0, 10_000));
        let hits: Vec<_> = hs.overlapping(&Span::new(500, 600)).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn overlapping_empty_hall() {
        let hs = make_hall();
        let hits: Vec<_> = hs.overlapping(&Span::new(0, 1000)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::AppointmentRequested {
            id: Ulid::new(),
            hall_id: Ulid::new(),
            user_id: Ulid::new(),
            span: Span::new(1000, 2000),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}

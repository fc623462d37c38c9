use crate::model::*;

// ── Free-time algebra ─────────────────────────────────────────────

/// Compute raw free intervals for one hall over the query window:
/// availability windows clamped to the query, minus every appointment that
/// still counts as busy (pending + approved). Rejected and cancelled
/// appointments are history and consume nothing.
pub fn free_intervals(hall: &HallState, query: &Span) -> Vec<Span> {
    let mut open: Vec<Span> = Vec::new();
    let mut busy: Vec<Span> = Vec::new();

    for entry in hall.overlapping(query) {
        let clamped = Span::new(
            entry.span.start.max(query.start),
            entry.span.end.min(query.end),
        );
        match &entry.kind {
            EntryKind::Window => open.push(clamped),
            EntryKind::Appointment { status, .. } if status.is_busy() => busy.push(clamped),
            _ => {} // rejected / cancelled
        }
    }

    open.sort_by_key(|s| s.start);
    let mut free = merge_overlapping(&open);

    if !busy.is_empty() {
        // Pending requests may overlap each other — normalize before subtracting.
        busy.sort_by_key(|s| s.start);
        let busy = merge_overlapping(&busy);
        free = subtract_intervals(&free, &busy);
    }

    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Remove `to_remove` from `base`. Both inputs sorted by start; `base`
/// disjoint. Each removal splits a base interval into at most two remainders;
/// empty remainders are discarded.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

/// Greedily slice each free interval into consecutive `step`-length slots
/// from its start. A trailing remainder shorter than `step` is dropped, not
/// returned as a partial slot. Slots whose end is not strictly after `now`
/// are kept but flagged unavailable.
pub fn quantize(free: &[Span], step: Ms, now: Ms) -> Vec<Slot> {
    debug_assert!(step > 0, "slot length must be positive");
    let mut slots = Vec::new();
    for span in free {
        let mut cursor = span.start;
        while cursor + step <= span.end {
            slots.push(Slot {
                start: cursor,
                end: cursor + step,
                available: cursor + step > now,
            });
            cursor += step;
        }
    }
    slots
}

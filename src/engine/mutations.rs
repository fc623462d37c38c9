use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::calendar::{self, BulkOutcome, BulkWindowRequest, SkipReason, SkippedDay};
use crate::limits::*;
use crate::model::*;
use crate::observability::{record_conflict, record_op};

use super::conflict::{
    check_approved_overlap, check_covered, check_window_overlap, checkin_window, validate_range,
};
use super::{Engine, EngineError, WalCommand};

fn validate_hall_fields(
    name: &str,
    address: &str,
    description: Option<&str>,
) -> Result<(), EngineError> {
    if name.is_empty() {
        return Err(EngineError::Validation("hall name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("hall name too long"));
    }
    if address.len() > MAX_ADDRESS_LEN {
        return Err(EngineError::LimitExceeded("hall address too long"));
    }
    if description.is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(EngineError::LimitExceeded("hall description too long"));
    }
    Ok(())
}

impl Engine {
    // ── Halls ────────────────────────────────────────────────

    pub async fn create_hall(
        &self,
        actor: &Actor,
        id: Ulid,
        name: String,
        address: String,
        price_per_hour: u32,
        description: Option<String>,
    ) -> Result<(), EngineError> {
        if actor.role != Role::Owner {
            return Err(EngineError::PermissionDenied);
        }
        validate_hall_fields(&name, &address, description.as_deref())?;
        if self.state.len() >= MAX_HALLS {
            return Err(EngineError::LimitExceeded("too many halls"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::HallCreated {
            id,
            owner_id: Some(actor.user_id),
            name: name.clone(),
            address: address.clone(),
            price_per_hour,
            description: description.clone(),
        };
        self.wal_append(&event).await?;
        let hs = HallState::new(id, Some(actor.user_id), name, address, price_per_hour, description);
        self.state.insert(id, Arc::new(RwLock::new(hs)));
        metrics::gauge!(crate::observability::HALLS_ACTIVE).set(self.state.len() as f64);
        self.notify.send(id, &event);
        tracing::info!(hall = %id, owner = %actor.user_id, "hall created");
        record_op("create_hall");
        Ok(())
    }

    pub async fn update_hall(
        &self,
        actor: &Actor,
        id: Ulid,
        name: String,
        address: String,
        price_per_hour: u32,
        description: Option<String>,
    ) -> Result<(), EngineError> {
        validate_hall_fields(&name, &address, description.as_deref())?;
        let hall = self.get_hall(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = hall.write().await;
        if !guard.is_owned_by(actor.user_id) {
            return Err(EngineError::PermissionDenied);
        }

        let event = Event::HallUpdated {
            id,
            name,
            address,
            price_per_hour,
            description,
        };
        self.persist_and_apply(id, &mut guard, &event).await?;
        record_op("update_hall");
        Ok(())
    }

    /// Delete a hall and everything it owns: windows, appointments, the
    /// entity-index entries and the notify channel all go with it.
    pub async fn delete_hall(&self, actor: &Actor, id: Ulid) -> Result<(), EngineError> {
        let hall = self.get_hall(&id).ok_or(EngineError::NotFound(id))?;
        let guard = hall.read().await;
        if !guard.is_owned_by(actor.user_id) {
            return Err(EngineError::PermissionDenied);
        }
        let entry_ids: Vec<Ulid> = guard.entries.iter().map(|e| e.id).collect();
        drop(guard);

        let event = Event::HallDeleted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        for entry_id in entry_ids {
            self.entity_to_hall.remove(&entry_id);
        }
        metrics::gauge!(crate::observability::HALLS_ACTIVE).set(self.state.len() as f64);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        tracing::info!(hall = %id, "hall deleted");
        record_op("delete_hall");
        Ok(())
    }

    /// Detach a removed owner account from all their halls. Invoked by the
    /// identity collaborator when the account is deleted; the halls stay,
    /// unowned. Returns the number of halls released.
    pub async fn release_owner(&self, owner_user_id: Ulid) -> Result<usize, EngineError> {
        let mut owned: Vec<Ulid> = Vec::new();
        for entry in self.state.iter() {
            let hall = entry.value().clone();
            if let Ok(guard) = hall.try_read()
                && guard.is_owned_by(owner_user_id)
            {
                owned.push(guard.id);
            }
        }

        let mut released = 0;
        for hall_id in owned {
            let Some(hall) = self.get_hall(&hall_id) else {
                continue; // deleted meanwhile
            };
            let mut guard = hall.write().await;
            if !guard.is_owned_by(owner_user_id) {
                continue;
            }
            let event = Event::HallOwnerReleased { id: hall_id };
            self.persist_and_apply(hall_id, &mut guard, &event).await?;
            released += 1;
        }
        record_op("release_owner");
        Ok(released)
    }

    // ── Availability windows ─────────────────────────────────

    pub async fn add_window(
        &self,
        actor: &Actor,
        id: Ulid,
        hall_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<(), EngineError> {
        let span = validate_range(start, end)?;
        let hall = self.get_hall(&hall_id).ok_or(EngineError::NotFound(hall_id))?;
        let mut guard = hall.write().await;
        if !guard.is_owned_by(actor.user_id) {
            return Err(EngineError::PermissionDenied);
        }
        if guard.entries.len() >= MAX_ENTRIES_PER_HALL {
            return Err(EngineError::LimitExceeded("too many entries on hall"));
        }

        if let Err(e) = check_window_overlap(&guard, &span) {
            record_conflict("add_window");
            return Err(e);
        }

        let event = Event::WindowAdded { id, hall_id, span };
        self.persist_and_apply(hall_id, &mut guard, &event).await?;
        record_op("add_window");
        Ok(())
    }

    /// Recurring availability: one window per matching calendar day. Dates
    /// that fail individually (overlap, DST gap) are reported and skipped;
    /// windows created before a skip stay — the batch is not atomic across
    /// dates.
    pub async fn bulk_add_windows(
        &self,
        actor: &Actor,
        hall_id: Ulid,
        req: &BulkWindowRequest,
    ) -> Result<BulkOutcome, EngineError> {
        if req.first_day > req.last_day {
            return Err(EngineError::Validation("date range is inverted"));
        }
        if calendar::range_days(req.first_day, req.last_day) > MAX_BULK_RANGE_DAYS {
            return Err(EngineError::LimitExceeded("bulk range too long"));
        }
        if req.daily_start >= req.daily_end {
            return Err(EngineError::Validation("daily start must be before daily end"));
        }
        let today = calendar::local_date_at(self.now_ms(), self.zone)
            .ok_or(EngineError::Validation("clock out of range"))?;
        if req.first_day < today {
            return Err(EngineError::Validation("range starts in the past"));
        }

        let hall = self.get_hall(&hall_id).ok_or(EngineError::NotFound(hall_id))?;
        let mut guard = hall.write().await;
        if !guard.is_owned_by(actor.user_id) {
            return Err(EngineError::PermissionDenied);
        }

        let mut outcome = BulkOutcome::default();
        for date in calendar::matching_days(req.first_day, req.last_day, &req.weekdays) {
            let Some(span) =
                calendar::local_day_span(date, req.daily_start, req.daily_end, self.zone)
            else {
                outcome.skipped.push(SkippedDay {
                    date,
                    reason: SkipReason::LocalTimeGap,
                });
                continue;
            };
            if guard.entries.len() >= MAX_ENTRIES_PER_HALL {
                return Err(EngineError::LimitExceeded("too many entries on hall"));
            }
            if check_window_overlap(&guard, &span).is_err() {
                record_conflict("bulk_add_windows");
                outcome.skipped.push(SkippedDay {
                    date,
                    reason: SkipReason::WindowOverlap,
                });
                continue;
            }

            let id = Ulid::new();
            let event = Event::WindowAdded { id, hall_id, span };
            self.persist_and_apply(hall_id, &mut guard, &event).await?;
            outcome.created.push(WindowInfo {
                id,
                hall_id,
                start: span.start,
                end: span.end,
            });
        }

        tracing::info!(
            hall = %hall_id,
            created = outcome.created.len(),
            skipped = outcome.skipped.len(),
            "bulk windows expanded"
        );
        record_op("bulk_add_windows");
        Ok(outcome)
    }

    pub async fn remove_window(&self, actor: &Actor, id: Ulid) -> Result<Ulid, EngineError> {
        let (hall_id, mut guard) = self.resolve_entity_write(&id).await?;
        if !guard.is_owned_by(actor.user_id) {
            return Err(EngineError::PermissionDenied);
        }
        if !guard.entry(id).is_some_and(Entry::is_window) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::WindowRemoved { id, hall_id };
        self.persist_and_apply(hall_id, &mut guard, &event).await?;
        record_op("remove_window");
        Ok(hall_id)
    }

    // ── Appointments ─────────────────────────────────────────

    /// File a booking request. The requested range must sit inside one
    /// availability window and stay clear of approved appointments; pending
    /// requests for the same time may pile up — the first approval wins.
    pub async fn request_appointment(
        &self,
        actor: &Actor,
        id: Ulid,
        hall_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<(), EngineError> {
        let span = validate_range(start, end)?;
        let hall = self.get_hall(&hall_id).ok_or(EngineError::NotFound(hall_id))?;
        let mut guard = hall.write().await;
        if guard.entries.len() >= MAX_ENTRIES_PER_HALL {
            return Err(EngineError::LimitExceeded("too many entries on hall"));
        }

        if let Err(e) = check_covered(&guard, &span).and_then(|()| {
            check_approved_overlap(&guard, &span, None)
        }) {
            record_conflict("request_appointment");
            return Err(e);
        }

        let event = Event::AppointmentRequested {
            id,
            hall_id,
            user_id: actor.user_id,
            span,
        };
        self.persist_and_apply(hall_id, &mut guard, &event).await?;
        record_op("request_appointment");
        Ok(())
    }

    /// Owner decision on a pending appointment. Approval re-validates the
    /// overlap check against approved appointments — state may have moved
    /// since the request was filed — and on conflict the appointment stays
    /// pending.
    pub async fn decide(
        &self,
        actor: &Actor,
        id: Ulid,
        decision: Decision,
    ) -> Result<(), EngineError> {
        let (hall_id, mut guard) = self.resolve_entity_write(&id).await?;
        if !guard.is_owned_by(actor.user_id) {
            return Err(EngineError::PermissionDenied);
        }
        let (status, span) = match guard.entry(id) {
            Some(Entry {
                span,
                kind: EntryKind::Appointment { status, .. },
                ..
            }) => (*status, *span),
            _ => return Err(EngineError::NotFound(id)),
        };
        if status != AppointmentStatus::Pending {
            return Err(EngineError::InvalidTransition { from: status });
        }

        let event = match decision {
            Decision::Approve => {
                if let Err(e) = check_approved_overlap(&guard, &span, Some(id)) {
                    record_conflict("approve_appointment");
                    return Err(e);
                }
                Event::AppointmentApproved { id, hall_id }
            }
            Decision::Reject => Event::AppointmentRejected { id, hall_id },
        };
        self.persist_and_apply(hall_id, &mut guard, &event).await?;
        tracing::debug!(appointment = %id, hall = %hall_id, ?decision, "appointment decided");
        record_op("decide");
        Ok(())
    }

    /// Cancel a pending or approved appointment. Allowed for the requesting
    /// user and the hall owner; terminal states stay terminal.
    pub async fn cancel(&self, actor: &Actor, id: Ulid) -> Result<(), EngineError> {
        let (hall_id, mut guard) = self.resolve_entity_write(&id).await?;
        let (user_id, status) = match guard.entry(id) {
            Some(Entry {
                kind: EntryKind::Appointment { user_id, status, .. },
                ..
            }) => (*user_id, *status),
            _ => return Err(EngineError::NotFound(id)),
        };
        if user_id != actor.user_id && !guard.is_owned_by(actor.user_id) {
            return Err(EngineError::PermissionDenied);
        }
        if status.is_terminal() {
            return Err(EngineError::InvalidTransition { from: status });
        }

        let event = Event::AppointmentCancelled { id, hall_id };
        self.persist_and_apply(hall_id, &mut guard, &event).await?;
        record_op("cancel");
        Ok(())
    }

    /// Flip the checked-in flag, once, while the appointment is approved and
    /// the clock is inside `[start − lead, end]`.
    pub async fn check_in(&self, actor: &Actor, id: Ulid) -> Result<(), EngineError> {
        let (hall_id, mut guard) = self.resolve_entity_write(&id).await?;
        let (user_id, status, checked_in, span) = match guard.entry(id) {
            Some(Entry {
                span,
                kind:
                    EntryKind::Appointment {
                        user_id,
                        status,
                        checked_in,
                    },
                ..
            }) => (*user_id, *status, *checked_in, *span),
            _ => return Err(EngineError::NotFound(id)),
        };
        if user_id != actor.user_id && !guard.is_owned_by(actor.user_id) {
            return Err(EngineError::PermissionDenied);
        }
        if status != AppointmentStatus::Approved {
            return Err(EngineError::InvalidTransition { from: status });
        }
        if checked_in {
            return Err(EngineError::AlreadyCheckedIn(id));
        }
        let allowed = checkin_window(&span);
        let now = self.now_ms();
        if now < allowed.start || now > allowed.end {
            return Err(EngineError::TimingWindow { allowed });
        }

        let event = Event::CheckedIn { id, hall_id };
        self.persist_and_apply(hall_id, &mut guard, &event).await?;
        record_op("check_in");
        Ok(())
    }

    // ── WAL housekeeping ─────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for item in self.state.iter() {
            let hall = item.value().clone();
            let guard = hall.try_read().expect("compact: uncontended read");

            events.push(Event::HallCreated {
                id: guard.id,
                owner_id: guard.owner_id,
                name: guard.name.clone(),
                address: guard.address.clone(),
                price_per_hour: guard.price_per_hour,
                description: guard.description.clone(),
            });

            for entry in &guard.entries {
                match &entry.kind {
                    EntryKind::Window => events.push(Event::WindowAdded {
                        id: entry.id,
                        hall_id: guard.id,
                        span: entry.span,
                    }),
                    EntryKind::Appointment {
                        user_id,
                        status,
                        checked_in,
                    } => {
                        events.push(Event::AppointmentRequested {
                            id: entry.id,
                            hall_id: guard.id,
                            user_id: *user_id,
                            span: entry.span,
                        });
                        match status {
                            AppointmentStatus::Pending => {}
                            AppointmentStatus::Approved => events.push(Event::AppointmentApproved {
                                id: entry.id,
                                hall_id: guard.id,
                            }),
                            AppointmentStatus::Rejected => events.push(Event::AppointmentRejected {
                                id: entry.id,
                                hall_id: guard.id,
                            }),
                            AppointmentStatus::Cancelled => {
                                events.push(Event::AppointmentCancelled {
                                    id: entry.id,
                                    hall_id: guard.id,
                                })
                            }
                        }
                        if *checked_in {
                            events.push(Event::CheckedIn {
                                id: entry.id,
                                hall_id: guard.id,
                            });
                        }
                    }
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

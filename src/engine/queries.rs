use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{free_intervals, quantize};
use super::{Engine, EngineError};

fn appointment_info(hall_id: Ulid, entry: &Entry) -> Option<AppointmentInfo> {
    match &entry.kind {
        EntryKind::Appointment {
            user_id,
            status,
            checked_in,
        } => Some(AppointmentInfo {
            id: entry.id,
            hall_id,
            user_id: *user_id,
            start: entry.span.start,
            end: entry.span.end,
            status: *status,
            checked_in: *checked_in,
        }),
        EntryKind::Window => None,
    }
}

impl Engine {
    fn validate_query(&self, start: Ms, end: Ms) -> Result<Span, EngineError> {
        if start >= end {
            return Err(EngineError::Validation("start must be before end"));
        }
        if end - start > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        Ok(Span::new(start, end))
    }

    /// Raw free time for a hall: availability windows intersecting the query,
    /// minus pending + approved appointments.
    pub async fn free(
        &self,
        hall_id: Ulid,
        query_start: Ms,
        query_end: Ms,
    ) -> Result<Vec<Span>, EngineError> {
        let query = self.validate_query(query_start, query_end)?;
        let hall = self.get_hall(&hall_id).ok_or(EngineError::NotFound(hall_id))?;
        let guard = hall.read().await;
        Ok(free_intervals(&guard, &query))
    }

    /// Free time plus fixed-length slots, as shown to players. Slots already
    /// in the past stay visible but are flagged unavailable.
    pub async fn free_slots(
        &self,
        hall_id: Ulid,
        query_start: Ms,
        query_end: Ms,
        slot_ms: Ms,
    ) -> Result<FreeTimes, EngineError> {
        if slot_ms <= 0 {
            return Err(EngineError::Validation("slot length must be positive"));
        }
        let free = self.free(hall_id, query_start, query_end).await?;
        let slots = quantize(&free, slot_ms, self.now_ms());
        Ok(FreeTimes { free, slots })
    }

    // ── Listings ─────────────────────────────────────────────

    pub async fn list_halls(&self) -> Vec<HallInfo> {
        let halls: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(halls.len());
        for hall in halls {
            let guard = hall.read().await;
            out.push(HallInfo {
                id: guard.id,
                owner_id: guard.owner_id,
                name: guard.name.clone(),
                address: guard.address.clone(),
                price_per_hour: guard.price_per_hour,
                description: guard.description.clone(),
            });
        }
        out
    }

    pub async fn halls_for_owner(&self, owner_id: Ulid) -> Vec<HallInfo> {
        self.list_halls()
            .await
            .into_iter()
            .filter(|h| h.owner_id == Some(owner_id))
            .collect()
    }

    /// Availability windows, optionally scoped to one hall.
    pub async fn windows(&self, hall_id: Option<Ulid>) -> Vec<WindowInfo> {
        let halls: Vec<_> = match hall_id {
            Some(id) => self.get_hall(&id).into_iter().collect(),
            None => self.state.iter().map(|e| e.value().clone()).collect(),
        };
        let mut out = Vec::new();
        for hall in halls {
            let guard = hall.read().await;
            out.extend(guard.entries.iter().filter(|e| e.is_window()).map(|e| WindowInfo {
                id: e.id,
                hall_id: guard.id,
                start: e.span.start,
                end: e.span.end,
            }));
        }
        out
    }

    /// Windows of every hall the requester owns.
    pub async fn windows_for_owner(&self, owner_id: Ulid) -> Vec<WindowInfo> {
        let halls: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for hall in halls {
            let guard = hall.read().await;
            if !guard.is_owned_by(owner_id) {
                continue;
            }
            out.extend(guard.entries.iter().filter(|e| e.is_window()).map(|e| WindowInfo {
                id: e.id,
                hall_id: guard.id,
                start: e.span.start,
                end: e.span.end,
            }));
        }
        out
    }

    /// Appointments in every state, optionally scoped to one hall.
    pub async fn appointments(&self, hall_id: Option<Ulid>) -> Vec<AppointmentInfo> {
        let halls: Vec<_> = match hall_id {
            Some(id) => self.get_hall(&id).into_iter().collect(),
            None => self.state.iter().map(|e| e.value().clone()).collect(),
        };
        let mut out = Vec::new();
        for hall in halls {
            let guard = hall.read().await;
            out.extend(guard.entries.iter().filter_map(|e| appointment_info(guard.id, e)));
        }
        out
    }

    pub async fn appointments_for_user(&self, user_id: Ulid) -> Vec<AppointmentInfo> {
        self.appointments(None)
            .await
            .into_iter()
            .filter(|a| a.user_id == user_id)
            .collect()
    }

    /// Pending requests awaiting the owner's decision. Owner-only.
    pub async fn pending_for_hall(
        &self,
        actor: &Actor,
        hall_id: Ulid,
    ) -> Result<Vec<AppointmentInfo>, EngineError> {
        let hall = self.get_hall(&hall_id).ok_or(EngineError::NotFound(hall_id))?;
        let guard = hall.read().await;
        if !guard.is_owned_by(actor.user_id) {
            return Err(EngineError::PermissionDenied);
        }
        Ok(guard
            .entries
            .iter()
            .filter_map(|e| appointment_info(hall_id, e))
            .filter(|a| a.status == AppointmentStatus::Pending)
            .collect())
    }

    /// Appointments the user may review: approved, checked in, and already
    /// over. Review storage itself is an external collaborator.
    pub async fn reviewable_for_user(&self, user_id: Ulid) -> Vec<AppointmentInfo> {
        let now = self.now_ms();
        self.appointments_for_user(user_id)
            .await
            .into_iter()
            .filter(|a| a.status == AppointmentStatus::Approved && a.checked_in && a.end <= now)
            .collect()
    }
}

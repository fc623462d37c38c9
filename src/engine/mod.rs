mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{free_intervals, merge_overlapping, quantize, subtract_intervals};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono_tz::Tz;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedHallState = Arc<RwLock<HallState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedHallState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: entry (window/appointment) id → hall id.
    pub(super) entity_to_hall: DashMap<Ulid, Ulid>,
    pub(super) clock: Arc<dyn Clock>,
    /// Canonical timezone for calendar-shaped input (bulk window creation).
    pub(super) zone: Tz,
}

/// Apply an event directly to a HallState (no locking — caller holds the lock).
fn apply_to_hall(hs: &mut HallState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::WindowAdded { id, hall_id, span } => {
            hs.insert_entry(Entry {
                id: *id,
                span: *span,
                kind: EntryKind::Window,
            });
            entity_map.insert(*id, *hall_id);
        }
        Event::WindowRemoved { id, .. } => {
            hs.remove_entry(*id);
            entity_map.remove(id);
        }
        Event::AppointmentRequested {
            id,
            hall_id,
            user_id,
            span,
        } => {
            hs.insert_entry(Entry {
                id: *id,
                span: *span,
                kind: EntryKind::Appointment {
                    user_id: *user_id,
                    status: AppointmentStatus::Pending,
                    checked_in: false,
                },
            });
            entity_map.insert(*id, *hall_id);
        }
        // Status flips keep the entry (and its entity mapping): rejected and
        // cancelled appointments stay on the timeline as history.
        Event::AppointmentApproved { id, .. } => {
            hs.set_appointment_status(*id, AppointmentStatus::Approved);
        }
        Event::AppointmentRejected { id, .. } => {
            hs.set_appointment_status(*id, AppointmentStatus::Rejected);
        }
        Event::AppointmentCancelled { id, .. } => {
            hs.set_appointment_status(*id, AppointmentStatus::Cancelled);
        }
        Event::CheckedIn { id, .. } => {
            hs.set_checked_in(*id);
        }
        Event::HallUpdated {
            name,
            address,
            price_per_hour,
            description,
            ..
        } => {
            hs.name = name.clone();
            hs.address = address.clone();
            hs.price_per_hour = *price_per_hour;
            hs.description = description.clone();
        }
        Event::HallOwnerReleased { .. } => {
            hs.owner_id = None;
        }
        // HallCreated/Deleted are handled at the DashMap level, not here
        Event::HallCreated { .. } | Event::HallDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        clock: Arc<dyn Clock>,
        zone: Tz,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            entity_to_hall: DashMap::new(),
            clock,
            zone,
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention).
        for event in &events {
            match event {
                Event::HallCreated {
                    id,
                    owner_id,
                    name,
                    address,
                    price_per_hour,
                    description,
                } => {
                    let hs = HallState::new(
                        *id,
                        *owner_id,
                        name.clone(),
                        address.clone(),
                        *price_per_hour,
                        description.clone(),
                    );
                    engine.state.insert(*id, Arc::new(RwLock::new(hs)));
                }
                Event::HallDeleted { id } => {
                    if let Some((_, hall)) = engine.state.remove(id) {
                        let guard = hall.try_read().expect("replay: uncontended read");
                        for entry in &guard.entries {
                            engine.entity_to_hall.remove(&entry.id);
                        }
                    }
                }
                other => {
                    if let Some(hall_id) = event_hall_id(other)
                        && let Some(entry) = engine.state.get(&hall_id)
                    {
                        let hall = entry.clone();
                        let mut guard = hall.try_write().expect("replay: uncontended write");
                        apply_to_hall(&mut guard, other, &engine.entity_to_hall);
                    }
                }
            }
        }
        metrics::gauge!(crate::observability::HALLS_ACTIVE).set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_hall(&self, id: &Ulid) -> Option<SharedHallState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn hall_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_hall.get(entity_id).map(|e| *e.value())
    }

    pub(super) fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        hall_id: Ulid,
        hs: &mut HallState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_hall(hs, event, &self.entity_to_hall);
        self.notify.send(hall_id, event);
        Ok(())
    }

    /// Lookup entry → hall, get hall, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<HallState>), EngineError> {
        let hall_id = self
            .hall_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let hall = self
            .get_hall(&hall_id)
            .ok_or(EngineError::NotFound(hall_id))?;
        let guard = hall.write_owned().await;
        Ok((hall_id, guard))
    }
}

/// Extract the hall_id from an event (for non-Create/Delete events).
fn event_hall_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::WindowAdded { hall_id, .. }
        | Event::WindowRemoved { hall_id, .. }
        | Event::AppointmentRequested { hall_id, .. }
        | Event::AppointmentApproved { hall_id, .. }
        | Event::AppointmentRejected { hall_id, .. }
        | Event::AppointmentCancelled { hall_id, .. }
        | Event::CheckedIn { hall_id, .. } => Some(*hall_id),
        Event::HallUpdated { id, .. } | Event::HallOwnerReleased { id } => Some(*id),
        Event::HallCreated { .. } | Event::HallDeleted { .. } => None,
    }
}

mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::{EngineError, ErrorKind, ValidationError};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedUnitState = Arc<RwLock<UnitState>>;

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
/// Appends from different units that arrive together share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                while let Ok(next) = rx.try_recv() {
                    match next {
                        WalCommand::Append { event, response } => batch.push((event, response)),
                        other => {
                            deferred = Some(other);
                            break;
                        }
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                if let Err(e) = &result {
                    tracing::error!("WAL flush of {} events failed: {e}", batch.len());
                }
                for (_, tx) in batch {
                    let _ = tx.send(
                        result
                            .as_ref()
                            .map(|_| ())
                            .map_err(|e| io::Error::new(e.kind(), e.to_string())),
                    );
                }

                if let Some(cmd) = deferred {
                    handle_non_append(&mut wal, cmd);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

/// All or nothing: a failed batch leaves no bytes behind for a later flush to commit.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err()
        && let Err(e) = wal.discard_uncommitted()
    {
        tracing::error!("WAL rollback failed, refusing writes until compaction: {e}");
    }
    result
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
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The availability engine.
///
/// Every unit lives behind its own `RwLock`. Admission takes the unit's write
/// lock, scans, appends to the WAL and applies before releasing it, so two
/// requests for the same unit are linearized while different units never
/// contend.
pub struct Engine {
    pub(super) units: DashMap<Ulid, SharedUnitState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) clock: Arc<dyn Clock>,
    /// Serializes unit creation and renumbering. Admissions never take it.
    pub(super) catalog: Mutex<()>,
    /// Reservation id → unit id
    pub(super) reservation_to_unit: DashMap<Ulid, Ulid>,
    /// Venue id → unit ids
    pub(super) venue_units: DashMap<Ulid, Vec<Ulid>>,
    /// (venue, kind, number) → unit id
    pub(super) unit_numbers: DashMap<(Ulid, UnitKind, u32), Ulid>,
    /// User id → reservation ids
    pub(super) user_reservations: DashMap<Ulid, Vec<Ulid>>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            units: DashMap::new(),
            wal_tx,
            notify,
            clock,
            catalog: Mutex::new(()),
            reservation_to_unit: DashMap::new(),
            venue_units: DashMap::new(),
            unit_numbers: DashMap::new(),
            user_reservations: DashMap::new(),
        };

        // We're the sole owner of these Arcs, so try_write always succeeds.
        // Never use blocking_write here: this may run inside an async context.
        for event in &events {
            match event {
                Event::UnitCreated { unit } => engine.insert_unit(unit.clone()),
                other => {
                    if let Some(rs) = engine.get_unit(&other.unit_id())
                        && let Ok(mut guard) = rs.try_write()
                    {
                        if let Event::ReservationConfirmed { reservation } = other
                            && reservation.is_active()
                            && let Some(existing) = guard.active_overlapping(&reservation.span).next()
                        {
                            tracing::warn!(
                                "skipping replayed reservation {}: overlaps {} on unit {}",
                                reservation.id,
                                existing.id,
                                reservation.unit_id
                            );
                            continue;
                        }
                        engine.apply(&mut guard, other);
                    }
                }
            }
        }

        metrics::gauge!(crate::observability::UNITS_ACTIVE).set(engine.units.len() as f64);
        tracing::debug!(
            "replayed {} events: {} units, {} reservations",
            events.len(),
            engine.units.len(),
            engine.reservation_to_unit.len()
        );
        Ok(engine)
    }

    pub fn get_unit(&self, id: &Ulid) -> Option<SharedUnitState> {
        self.units.get(id).map(|e| e.value().clone())
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_to_unit.len()
    }

    /// Register a new unit in the state map and the venue/number indexes.
    fn insert_unit(&self, unit: Unit) {
        self.unit_numbers.insert(unit.number_key(), unit.id);
        self.venue_units.entry(unit.venue_id).or_default().push(unit.id);
        self.units.insert(unit.id, Arc::new(RwLock::new(UnitState::new(unit))));
    }

    /// Apply a unit-scoped event (caller holds the unit's write lock).
    fn apply(&self, us: &mut UnitState, event: &Event) {
        match event {
            Event::UnitUpdated { unit } => {
                let old_key = us.unit.number_key();
                if old_key != unit.number_key() {
                    self.unit_numbers.remove(&old_key);
                    self.unit_numbers.insert(unit.number_key(), unit.id);
                }
                us.unit = unit.clone();
            }
            Event::ReservationConfirmed { reservation } => {
                self.reservation_to_unit.insert(reservation.id, reservation.unit_id);
                if let Some(user_id) = reservation.user_id {
                    self.user_reservations
                        .entry(user_id)
                        .or_default()
                        .push(reservation.id);
                }
                us.insert_reservation(reservation.clone());
            }
            Event::ReservationCancelled { id, at, .. } => {
                if let Some(r) = us.reservation_mut(*id) {
                    r.status = ReservationStatus::Cancelled;
                    r.updated_at = *at;
                }
            }
            // UnitCreated is handled at the DashMap level.
            Event::UnitCreated { .. } => {}
        }
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

    /// WAL-append, then apply, then notify. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        us: &mut UnitState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply(us, event);
        self.notify.send(event.unit_id(), event);
        Ok(())
    }

    /// Lookup reservation → unit, acquire the unit's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<UnitState>, EngineError> {
        let rs = self.reservation_unit(reservation_id)?;
        Ok(rs.write_owned().await)
    }

    pub(super) fn reservation_unit(&self, reservation_id: Ulid) -> Result<SharedUnitState, EngineError> {
        self.reservation_to_unit
            .get(&reservation_id)
            .map(|e| *e.value())
            .and_then(|unit_id| self.get_unit(&unit_id))
            .ok_or(EngineError::ReservationNotFound(reservation_id))
    }
}

use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{self, outcome_label};
use crate::validation::{validate_guest, validate_party_size, validate_span};

use super::conflict::{check_no_overlap, check_party_fits, effective_price};
use super::{Engine, EngineError, ValidationError, WalCommand};

fn validate_unit(unit: &Unit) -> Result<(), ValidationError> {
    if unit.details.declared_capacity() == Some(0) {
        return Err(ValidationError::ZeroCapacity);
    }
    if unit.details.label().len() > MAX_LABEL_LEN {
        return Err(ValidationError::LabelTooLong);
    }
    Ok(())
}

impl Engine {
    pub async fn create_unit(&self, unit: Unit) -> Result<Unit, EngineError> {
        validate_unit(&unit)?;
        let _catalog = self.catalog.lock().await;
        if self.units.len() >= MAX_UNITS {
            return Err(ValidationError::LimitExceeded("too many units").into());
        }
        if self.units.contains_key(&unit.id) {
            return Err(EngineError::UnitExists(unit.id));
        }
        if self.unit_numbers.contains_key(&unit.number_key()) {
            return Err(EngineError::DuplicateUnitNumber {
                venue_id: unit.venue_id,
                kind: unit.kind(),
                number: unit.number,
            });
        }

        let event = Event::UnitCreated { unit: unit.clone() };
        self.wal_append(&event).await?;
        self.insert_unit(unit.clone());
        self.notify.send(unit.id, &event);
        metrics::gauge!(observability::UNITS_ACTIVE).set(self.units.len() as f64);
        info!("created {} {} #{} in venue {}", unit.kind().noun(), unit.id, unit.number, unit.venue_id);
        Ok(unit)
    }

    /// Replace a unit's number, price and details. Venue and kind are fixed.
    pub async fn update_unit(&self, unit: Unit) -> Result<Unit, EngineError> {
        validate_unit(&unit)?;
        let _catalog = self.catalog.lock().await;
        let rs = self
            .get_unit(&unit.id)
            .ok_or_else(|| EngineError::unit_not_found(unit.kind(), unit.id))?;
        let mut guard = rs.write().await;
        if guard.unit.venue_id != unit.venue_id || guard.unit.kind() != unit.kind() {
            return Err(ValidationError::ImmutableUnitField(unit.id).into());
        }
        if guard.unit.number != unit.number && self.unit_numbers.contains_key(&unit.number_key()) {
            return Err(EngineError::DuplicateUnitNumber {
                venue_id: unit.venue_id,
                kind: unit.kind(),
                number: unit.number,
            });
        }

        let event = Event::UnitUpdated { unit: unit.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(unit)
    }

    /// Admit or reject a reservation request.
    ///
    /// Structural checks run first and take no lock. The overlap scan and the
    /// insert then run under the unit's write lock, with the WAL append
    /// completing before the lock is released.
    pub async fn check_and_reserve(
        &self,
        request: ReservationRequest,
    ) -> Result<Reservation, EngineError> {
        let kind = UnitKind::normalize(request.booking_type.as_deref());
        let started = Instant::now();
        let result = self.admit(kind, request).await;
        metrics::histogram!(observability::ADMISSION_DURATION_SECONDS, "kind" => kind.as_str())
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(
            observability::RESERVATIONS_TOTAL,
            "kind" => kind.as_str(),
            "outcome" => outcome_label(&result)
        )
        .increment(1);
        result
    }

    async fn admit(&self, kind: UnitKind, request: ReservationRequest) -> Result<Reservation, EngineError> {
        let guest = validate_guest(&request.guest)?;
        let party_size = validate_party_size(request.party_size)?;
        let span = validate_span(request.start, request.end)?;

        let rs = self
            .get_unit(&request.unit_id)
            .ok_or_else(|| EngineError::unit_not_found(kind, request.unit_id))?;
        let mut guard = rs.write().await;
        if guard.unit.venue_id != request.venue_id || guard.unit.kind() != kind {
            return Err(EngineError::unit_not_found(kind, request.unit_id));
        }
        check_party_fits(&guard.unit, party_size)?;
        let now = self.clock.now_ms();
        // Cancelled and finished reservations stay in state but never count here.
        if guard.live_reservations(now) >= MAX_RESERVATIONS_PER_UNIT {
            return Err(ValidationError::LimitExceeded("too many reservations on unit").into());
        }
        let total_price = effective_price(&guard.unit, request.price_override);

        if let Err(e) = check_no_overlap(&guard, &span) {
            debug!("rejected {kind} {} [{}, {}): {e}", request.unit_id, span.start, span.end);
            return Err(e);
        }

        let reservation = Reservation {
            id: Ulid::new(),
            user_id: request.user_id,
            venue_id: request.venue_id,
            kind,
            unit_id: request.unit_id,
            span,
            status: ReservationStatus::Confirmed,
            total_price,
            guest,
            party_size,
            created_at: now,
            updated_at: now,
        };
        let event = Event::ReservationConfirmed {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(
            "confirmed reservation {} on {kind} {} [{}, {})",
            reservation.id, reservation.unit_id, span.start, span.end
        );
        Ok(reservation)
    }

    /// Move a reservation to CANCELLED. One-way; the interval is free for the
    /// next admission on the unit as soon as this returns.
    pub async fn cancel(&self, id: Ulid, requester: &Requester) -> Result<Reservation, EngineError> {
        let result = self.cancel_inner(id, requester).await;
        metrics::counter!(observability::CANCELLATIONS_TOTAL, "outcome" => outcome_label(&result))
            .increment(1);
        result
    }

    async fn cancel_inner(&self, id: Ulid, requester: &Requester) -> Result<Reservation, EngineError> {
        let mut guard = self.resolve_reservation_write(id).await?;
        let status = guard
            .reservation(id)
            .filter(|r| requester.can_access(r))
            .map(|r| r.status)
            .ok_or(EngineError::ReservationNotFound(id))?;
        if status == ReservationStatus::Cancelled {
            return Err(EngineError::AlreadyCancelled(id));
        }

        let event = Event::ReservationCancelled {
            id,
            unit_id: guard.unit.id,
            at: self.clock.now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("cancelled reservation {id} on {} {}", guard.unit.kind(), guard.unit.id);
        guard
            .reservation(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    ///
    /// Read locks on every unit are held until the rewritten file is swapped
    /// in, so no append can land in the old file after its unit was snapshotted.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        let mut unit_ids: Vec<Ulid> = self.units.iter().map(|e| *e.key()).collect();
        unit_ids.sort();

        let mut guards = Vec::with_capacity(unit_ids.len());
        let mut events = Vec::new();
        for id in unit_ids {
            let Some(rs) = self.get_unit(&id) else { continue };
            let guard = rs.read_owned().await;
            events.push(Event::UnitCreated {
                unit: guard.unit.clone(),
            });
            events.extend(guard.reservations.iter().map(|r| Event::ReservationConfirmed {
                reservation: r.clone(),
            }));
            guards.push(guard);
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()));
        drop(guards);
        result
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

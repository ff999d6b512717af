use std::collections::HashMap;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::unit_status;
use super::{Engine, EngineError, ValidationError};

impl Engine {
    pub async fn unit(&self, id: Ulid) -> Option<Unit> {
        let rs = self.get_unit(&id)?;
        let guard = rs.read().await;
        Some(guard.unit.clone())
    }

    /// Reserved iff a non-cancelled reservation overlaps `window`. Without a
    /// window every known unit is available. Unknown ids are left out.
    pub async fn compute_availability(
        &self,
        unit_ids: &[Ulid],
        window: Option<Span>,
    ) -> Result<HashMap<Ulid, UnitStatus>, EngineError> {
        if unit_ids.len() > MAX_AVAILABILITY_IDS {
            return Err(ValidationError::LimitExceeded("too many unit IDs").into());
        }
        let mut statuses = HashMap::with_capacity(unit_ids.len());
        for &id in unit_ids {
            let Some(rs) = self.get_unit(&id) else { continue };
            let guard = rs.read().await;
            statuses.insert(id, unit_status(&guard, window.as_ref()));
        }
        Ok(statuses)
    }

    /// A venue's units sorted by kind then number, each with its status for `window`.
    pub async fn venue_units(
        &self,
        venue_id: Ulid,
        kind: Option<UnitKind>,
        window: Option<Span>,
    ) -> Vec<UnitListing> {
        let unit_ids = self
            .venue_units
            .get(&venue_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut listings = Vec::with_capacity(unit_ids.len());
        for id in unit_ids {
            let Some(rs) = self.get_unit(&id) else { continue };
            let guard = rs.read().await;
            if kind.is_some_and(|k| k != guard.unit.kind()) {
                continue;
            }
            listings.push(UnitListing {
                unit: guard.unit.clone(),
                status: unit_status(&guard, window.as_ref()),
            });
        }
        listings.sort_by_key(|l| (l.unit.kind(), l.unit.number));
        listings
    }

    /// Owner or admin only; anyone else gets NotFound.
    pub async fn get_reservation(
        &self,
        id: Ulid,
        requester: &Requester,
    ) -> Result<Reservation, EngineError> {
        let rs = self.reservation_unit(id)?;
        let guard = rs.read().await;
        guard
            .reservation(id)
            .filter(|r| requester.can_access(r))
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))
    }

    /// Every reservation the user made, most recent start first.
    pub async fn list_user_reservations(&self, user_id: Ulid) -> Vec<Reservation> {
        let ids = self
            .user_reservations
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut reservations = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(rs) = self.reservation_unit(id) else { continue };
            let guard = rs.read().await;
            if let Some(r) = guard.reservation(id) {
                reservations.push(r.clone());
            }
        }
        reservations.sort_by(|a, b| b.span.start.cmp(&a.span.start));
        reservations
    }

    pub async fn ticket(&self, id: Ulid, requester: &Requester) -> Result<Ticket, EngineError> {
        let rs = self.reservation_unit(id)?;
        let guard = rs.read().await;
        let r = guard
            .reservation(id)
            .filter(|r| requester.can_access(r))
            .ok_or(EngineError::ReservationNotFound(id))?;
        Ok(Ticket {
            reservation_id: r.id,
            start_at: r.span.start,
            end_at: r.span.end,
            status: r.status,
            booking_type: r.kind,
            total_price: r.total_price,
            party_size: r.party_size,
            venue_id: r.venue_id,
            unit_number: guard.unit.number,
            qr_payload: r.id.to_string(),
        })
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::DEFAULT_UNIT_CAPACITY;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Amount in minor currency units.
pub type Price = u64;

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

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && self.end > other.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitKind {
    Table,
    Room,
    Seat,
}

impl UnitKind {
    /// Permissive: anything that is not exactly `ROOM` or `SEAT` books a table.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw {
            Some("ROOM") => UnitKind::Room,
            Some("SEAT") => UnitKind::Seat,
            _ => UnitKind::Table,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Table => "TABLE",
            UnitKind::Room => "ROOM",
            UnitKind::Seat => "SEAT",
        }
    }

    pub fn noun(&self) -> &'static str {
        match self {
            UnitKind::Table => "table",
            UnitKind::Room => "room",
            UnitKind::Seat => "seat",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific attributes of a bookable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitDetails {
    Table {
        capacity: Option<u32>,
        location_label: String,
        vip: bool,
    },
    Room {
        capacity: Option<u32>,
        room_type: String,
    },
    Seat {
        zone: String,
    },
}

impl UnitDetails {
    pub fn kind(&self) -> UnitKind {
        match self {
            UnitDetails::Table { .. } => UnitKind::Table,
            UnitDetails::Room { .. } => UnitKind::Room,
            UnitDetails::Seat { .. } => UnitKind::Seat,
        }
    }

    /// Guests the unit holds. Seats always hold one.
    pub fn capacity(&self) -> u32 {
        match self {
            UnitDetails::Table { capacity, .. } | UnitDetails::Room { capacity, .. } => {
                capacity.unwrap_or(DEFAULT_UNIT_CAPACITY)
            }
            UnitDetails::Seat { .. } => 1,
        }
    }

    pub(crate) fn declared_capacity(&self) -> Option<u32> {
        match self {
            UnitDetails::Table { capacity, .. } | UnitDetails::Room { capacity, .. } => *capacity,
            UnitDetails::Seat { .. } => None,
        }
    }

    pub(crate) fn label(&self) -> &str {
        match self {
            UnitDetails::Table { location_label, .. } => location_label,
            UnitDetails::Room { room_type, .. } => room_type,
            UnitDetails::Seat { zone } => zone,
        }
    }
}

/// A table, room or seat inside a venue.
///
/// `base_price` is per table, per night or per seat depending on the kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub number: u32,
    pub base_price: Price,
    pub details: UnitDetails,
}

impl Unit {
    pub fn kind(&self) -> UnitKind {
        self.details.kind()
    }

    pub fn capacity(&self) -> u32 {
        self.details.capacity()
    }

    /// Composite uniqueness key within a venue.
    pub fn number_key(&self) -> (Ulid, UnitKind, u32) {
        (self.venue_id, self.kind(), self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    /// Pending and confirmed reservations hold their interval.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestInfo {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub user_id: Option<Ulid>,
    pub venue_id: Ulid,
    pub kind: UnitKind,
    pub unit_id: Ulid,
    pub span: Span,
    pub status: ReservationStatus,
    pub total_price: Price,
    pub guest: GuestInfo,
    pub party_size: u32,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    fn unit_ref(&self, kind: UnitKind) -> Option<Ulid> {
        (self.kind == kind).then_some(self.unit_id)
    }

    pub fn table_id(&self) -> Option<Ulid> {
        self.unit_ref(UnitKind::Table)
    }

    pub fn room_id(&self) -> Option<Ulid> {
        self.unit_ref(UnitKind::Room)
    }

    pub fn seat_id(&self) -> Option<Ulid> {
        self.unit_ref(UnitKind::Seat)
    }
}

/// Flat persisted shape shared with the HTTP and reporting collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRecord {
    pub id: Ulid,
    pub user_id: Option<Ulid>,
    pub venue_id: Ulid,
    pub booking_type: UnitKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_id: Option<Ulid>,
    pub start_at: Ms,
    pub end_at: Ms,
    pub status: ReservationStatus,
    pub total_price: Price,
    pub guest_first_name: String,
    pub guest_last_name: String,
    pub guest_phone: String,
    pub party_size: u32,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl From<&Reservation> for ReservationRecord {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            venue_id: r.venue_id,
            booking_type: r.kind,
            table_id: r.table_id(),
            room_id: r.room_id(),
            seat_id: r.seat_id(),
            start_at: r.span.start,
            end_at: r.span.end,
            status: r.status,
            total_price: r.total_price,
            guest_first_name: r.guest.first_name.clone(),
            guest_last_name: r.guest.last_name.clone(),
            guest_phone: r.guest.phone.clone(),
            party_size: r.party_size,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Input to an admission decision, as received from the HTTP layer.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub user_id: Option<Ulid>,
    /// Raw booking type; normalized with [`UnitKind::normalize`].
    pub booking_type: Option<String>,
    pub unit_id: Ulid,
    pub venue_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    /// Missing means a party of one.
    pub party_size: Option<u32>,
    pub guest: GuestInfo,
    /// Zero is treated as absent.
    pub price_override: Option<Price>,
}

/// Who is asking. Admins bypass ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Ulid,
    pub admin: bool,
}

impl Requester {
    pub fn user(user_id: Ulid) -> Self {
        Self { user_id, admin: false }
    }

    pub fn admin(user_id: Ulid) -> Self {
        Self { user_id, admin: true }
    }

    pub fn can_access(&self, reservation: &Reservation) -> bool {
        self.admin || reservation.user_id == Some(self.user_id)
    }
}

/// State of one unit: its record plus every reservation ever made on it.
#[derive(Debug, Clone)]
pub struct UnitState {
    pub unit: Unit,
    /// Sorted by `span.start`. Cancelled reservations stay in place.
    pub reservations: Vec<Reservation>,
}

impl UnitState {
    pub fn new(unit: Unit) -> Self {
        Self {
            unit,
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.span.start <= reservation.span.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn reservation_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Active reservations that have not ended by `now`.
    pub fn live_reservations(&self, now: Ms) -> usize {
        self.reservations
            .iter()
            .filter(|r| r.is_active() && r.span.end > now)
            .count()
    }

    /// Non-cancelled reservations whose span overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn active_overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start && r.is_active())
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UnitCreated {
        unit: Unit,
    },
    UnitUpdated {
        unit: Unit,
    },
    ReservationConfirmed {
        reservation: Reservation,
    },
    ReservationCancelled {
        id: Ulid,
        unit_id: Ulid,
        at: Ms,
    },
}

impl Event {
    pub fn unit_id(&self) -> Ulid {
        match self {
            Event::UnitCreated { unit } | Event::UnitUpdated { unit } => unit.id,
            Event::ReservationConfirmed { reservation } => reservation.unit_id,
            Event::ReservationCancelled { unit_id, .. } => *unit_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Available,
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitListing {
    pub unit: Unit,
    pub status: UnitStatus,
}

/// Data printed on a reservation ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub reservation_id: Ulid,
    pub start_at: Ms,
    pub end_at: Ms,
    pub status: ReservationStatus,
    pub booking_type: UnitKind,
    pub total_price: Price,
    pub party_size: u32,
    pub venue_id: Ulid,
    pub unit_number: u32,
    pub qr_payload: String,
}

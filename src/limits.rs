use crate::model::Ms;

const DAY_MS: Ms = 86_400_000;

// ── Admission ────────────────────────────────────────────────────

pub const MIN_PARTY_SIZE: u32 = 1;
pub const MAX_PARTY_SIZE: u32 = 20;

/// Used when a table or room record carries no capacity.
pub const DEFAULT_UNIT_CAPACITY: u32 = 4;

pub const MAX_GUEST_NAME_LEN: usize = 100;

// ── Time ─────────────────────────────────────────────────────────

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// 10000-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_800_000;

/// Longest single reservation: one year of hotel nights.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * DAY_MS;

// ── Storage ──────────────────────────────────────────────────────

pub const MAX_UNITS: usize = 100_000;
pub const MAX_RESERVATIONS_PER_UNIT: usize = 100_000;
pub const MAX_LABEL_LEN: usize = 256;

/// Upper bound on unit ids in a single availability query.
pub const MAX_AVAILABILITY_IDS: usize = 1_000;

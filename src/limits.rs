/// Earliest year a calendar date may fall in.
pub const MIN_VALID_YEAR: i32 = 1970;

/// Latest year a calendar date may fall in.
pub const MAX_VALID_YEAR: i32 = 2200;

/// Widest single range the engine will reconcile (~10 years).
pub const MAX_RANGE_DAYS: i64 = 3660;

/// Most dates one selection may carry.
pub const MAX_SELECTION_DATES: usize = 3660;

/// Most periods a listing may hold per kind.
pub const MAX_PERIODS_PER_LISTING: usize = 10_000;

/// Most listings one store will track.
pub const MAX_LISTINGS: usize = 100_000;

/// Largest gap-day buffer the projector accepts.
pub const MAX_GAP_DAYS: u32 = 365;

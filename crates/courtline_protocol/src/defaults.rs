//! Fixed operating defaults for the feature pipeline.

/// Quality weight for a value resolved from its primary source.
pub const WEIGHT_PRIMARY: f64 = 100.0;
/// Quality weight for a value resolved from the coarser secondary source.
pub const WEIGHT_SECONDARY: f64 = 87.0;
/// Quality weight for a value derived on the fly.
pub const WEIGHT_COMPUTED: f64 = 100.0;
/// Quality weight for a defaulted value (either kind of default).
pub const WEIGHT_DEFAULT: f64 = 40.0;

/// Consecutive incompleteness skips before the breaker trips.
pub const BREAKER_TRIP_THRESHOLD: u32 = 3;
/// Lockout applied when the breaker trips.
pub const BREAKER_LOCKOUT_HOURS: i64 = 24;

/// Hard floor: entities with fewer recorded games are never processed,
/// bootstrap overrides included.
pub const MIN_GAMES_ABSOLUTE: u32 = 5;

/// Minimum samples before rate-style computed fields trust the data.
pub const MIN_SAMPLES_FOR_RATES: u32 = 5;
/// League-average free-throw share used under the sample floor.
pub const LEAGUE_AVG_FT_SHARE: f64 = 0.19;

/// Completeness percentage a window must reach to be production-ready.
pub const COMPLETENESS_THRESHOLD_PCT: f64 = 100.0;
/// How far back to look for the last league active day when widening
/// day-based windows across scheduling gaps.
pub const GAP_LOOKBACK_DAYS: i64 = 30;

/// Fewer league active days than this before the analysis date means the
/// run is a bootstrap run.
pub const BOOTSTRAP_ACTIVE_DAY_FLOOR: usize = 10;
/// Days after season start during which the boundary override applies.
pub const SEASON_BOUNDARY_DAYS: i64 = 21;

/// Rows per write batch.
pub const WRITE_BATCH_SIZE: usize = 100;
/// Attempts per batch before recording it as failed.
pub const WRITE_MAX_ATTEMPTS: u32 = 3;
/// Fixed backoff between batch attempts.
pub const WRITE_BACKOFF_MS: u64 = 250;

/// Progress is logged every this many completed entities.
pub const PROGRESS_LOG_INTERVAL: usize = 50;

/// Hex characters kept from the idempotency digest.
pub const CONTENT_HASH_LEN: usize = 16;

/// Ledger processor name under which breaker attempts are recorded.
pub const PROCESSOR_NAME: &str = "player_features";

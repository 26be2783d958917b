/// Derived-state engine
///
/// Recomputes, from the current habit/completion set, the three caches the UI
/// reads: per-day aggregate status, current/longest streak, and the unlocked
/// milestone set. All computations here are pure and never fail on empty
/// input; persistence is confined to the `refresh_*` helpers.

pub mod day_status;
pub mod streak;

pub use day_status::*;
pub use streak::*;

//! Time management: turns UCI `go` parameters into a millisecond budget
//! and exposes the sticky `should_end()` predicate the search polls at
//! every node entry (spec §4.5 step 1, §6.5).
//!
//! Grounded on the teacher's `uci.rs::GoParams::compute_time_ms` (the
//! allocation formula) and `search.rs::SearchState::check_time`/
//! `is_stopped` (the sticky hard-limit check), pulled into their own
//! module per spec.md's component list — the teacher's own `time.rs` is a
//! comment-only stub pointing back at those two call sites.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Consulted by the search at every node; becomes sticky-true once the
/// allotted time is exhausted or the external stop flag is set, and never
/// reports `false` again until the next [`TimeManager::start`].
pub struct TimeManager {
    start: Instant,
    hard_limit_ms: u64,
    stop: Arc<AtomicBool>,
    tripped: bool,
}

impl TimeManager {
    /// `stop` is the flag a UCI `stop`/`quit` command sets from another
    /// thread; the search never sees that thread directly, only this flag.
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self {
            start: Instant::now(),
            hard_limit_ms: 0,
            stop,
            tripped: false,
        }
    }

    /// Begin a fresh search window. `hard_limit_ms == 0` means unlimited
    /// (depth-limited search; `should_end` then only honors the stop flag).
    pub fn start(&mut self, hard_limit_ms: u64) {
        self.start = Instant::now();
        self.hard_limit_ms = hard_limit_ms;
        self.tripped = false;
    }

    pub fn should_end(&mut self) -> bool {
        if self.tripped {
            return true;
        }
        let timed_out = self.hard_limit_ms > 0 && self.get_search_time() >= self.hard_limit_ms;
        if timed_out || self.stop.load(Ordering::Relaxed) {
            self.tripped = true;
        }
        self.tripped
    }

    pub fn get_search_time(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn get_nps(&self, nodes: u64) -> u64 {
        nodes * 1000 / self.get_search_time().max(1)
    }

    /// Soft limit consulted between iterative-deepening iterations: don't
    /// start a deeper (and much costlier) iteration once half the budget
    /// for this `go` is already spent.
    pub fn past_soft_limit(&self) -> bool {
        self.hard_limit_ms > 0 && self.get_search_time() > self.hard_limit_ms / 2
    }
}

/// Allocate a hard time limit in milliseconds from the remaining clock,
/// increment, and moves-to-go, per the standard `my_time/movestogo +
/// 3/4*increment` formula, capped at 80% of remaining time so the engine
/// never risks flagging. Returns 0 (unlimited) when there's no time
/// control to honor.
pub fn allocate_ms(
    movetime: Option<u64>,
    my_time: Option<u64>,
    my_inc: Option<u64>,
    moves_to_go: Option<u64>,
    infinite: bool,
) -> u64 {
    if infinite {
        return 0;
    }
    if let Some(mt) = movetime {
        return mt;
    }

    let my_time = match my_time {
        Some(t) if t > 0 => t,
        _ => return 0,
    };
    let my_inc = my_inc.unwrap_or(0);
    let moves_left = moves_to_go.unwrap_or(30).max(1);

    let base = my_time / moves_left;
    let inc_bonus = my_inc * 3 / 4;
    let allocated = base + inc_bonus;

    allocated.min(my_time * 4 / 5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_when_no_time_control() {
        assert_eq!(allocate_ms(None, None, None, None, false), 0);
    }

    #[test]
    fn infinite_overrides_everything() {
        assert_eq!(allocate_ms(Some(5000), Some(60_000), Some(1000), None, true), 0);
    }

    #[test]
    fn movetime_is_used_directly() {
        assert_eq!(allocate_ms(Some(2500), Some(60_000), None, None, false), 2500);
    }

    #[test]
    fn allocation_respects_80_percent_cap() {
        let ms = allocate_ms(None, Some(1000), None, Some(1), false);
        assert!(ms <= 800, "allocation {ms} exceeded 80% cap");
    }

    #[test]
    fn allocation_in_reasonable_range() {
        let ms = allocate_ms(None, Some(60_000), Some(1000), None, false);
        assert!(ms > 0 && ms <= 48_000, "allocation {ms} out of range");
    }

    #[test]
    fn should_end_is_sticky() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut tm = TimeManager::new(stop.clone());
        tm.start(0);
        assert!(!tm.should_end());
        stop.store(true, Ordering::Relaxed);
        assert!(tm.should_end());
        stop.store(false, Ordering::Relaxed);
        assert!(tm.should_end(), "should_end must stay true once tripped");
    }

    #[test]
    fn should_end_trips_on_hard_limit() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut tm = TimeManager::new(stop);
        tm.start(1);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(tm.should_end());
    }
}

use crate::board::ChessMove;
use crate::types::{Score, MATE_VALUE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Exact,
    Lower, // beta cutoff (score >= beta)
    Upper, // failed low (score <= alpha)
}

#[derive(Clone, Copy)]
pub struct TTEntry {
    pub key: u64, // full Zobrist hash, for collision detection
    pub depth: u8,
    pub score: Score,
    pub bound: Bound,
    pub best_move: Option<ChessMove>,
    pub age: u8, // generation, wraps mod 64
}

impl Default for TTEntry {
    fn default() -> Self {
        Self {
            key: 0,
            depth: 0,
            score: 0,
            bound: Bound::Exact,
            best_move: None,
            age: 0,
        }
    }
}

pub struct TranspositionTable {
    entries: Vec<TTEntry>,
    mask: usize,
    generation: u8,
}

impl TranspositionTable {
    /// New table sized to fit `mb` megabytes, rounded down to a power of two
    /// entry count (minimum 1024 entries).
    pub fn new(mb: usize) -> Self {
        let entry_size = std::mem::size_of::<TTEntry>();
        let num_entries = (mb * 1024 * 1024) / entry_size;
        let size = num_entries.next_power_of_two() / 2;
        let size = size.max(1024);

        Self {
            entries: vec![TTEntry::default(); size],
            mask: size - 1,
            generation: 0,
        }
    }

    /// Bump the generation counter. Called once per completed `go`, not once
    /// per iterative-deepening depth.
    pub fn bump_age(&mut self) {
        self.generation = (self.generation + 1) % 64;
    }

    pub fn probe(&self, hash: u64) -> Option<&TTEntry> {
        let entry = &self.entries[hash as usize & self.mask];
        if entry.key == hash {
            Some(entry)
        } else {
            None
        }
    }

    /// Resolve a probed entry into a usable score at `ply`, honoring the
    /// bound flag against the current window. Adjusts a stored mate score
    /// (relative to the position where it was found) back to a score
    /// relative to the current root-distance `ply`.
    pub fn retrieve_score(entry: &TTEntry, ply: usize, alpha: Score, beta: Score) -> Option<Score> {
        let score = adjust_mate_from_storage(entry.score, ply);

        match entry.bound {
            Bound::Exact => Some(score),
            Bound::Lower if score >= beta => Some(score),
            Bound::Upper if score <= alpha => Some(score),
            _ => None,
        }
    }

    /// Store a search result, applying the exact replacement policy: replace
    /// an empty slot, an entry from an older generation, or an entry from a
    /// strictly shallower search; otherwise keep the incumbent.
    pub fn store(
        &mut self,
        hash: u64,
        depth: u8,
        score: Score,
        bound: Bound,
        best_move: Option<ChessMove>,
        ply: usize,
    ) {
        let idx = hash as usize & self.mask;
        let incumbent = &self.entries[idx];

        let should_replace = incumbent.key == 0
            || incumbent.age != self.generation
            || depth > incumbent.depth;

        if !should_replace {
            return;
        }

        self.entries[idx] = TTEntry {
            key: hash,
            depth,
            score: adjust_mate_for_storage(score, ply),
            bound,
            best_move,
            age: self.generation,
        };
    }

    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = TTEntry::default();
        }
        self.generation = 0;
    }
}

/// Stored scores are relative to the node they were found in ("mate in N
/// from here"); this converts to a score relative to the search root
/// ("mate in N+ply from root") on the way out of the table.
fn adjust_mate_from_storage(score: Score, ply: usize) -> Score {
    if score > MATE_VALUE - 100 {
        score - ply as Score
    } else if score < -MATE_VALUE + 100 {
        score + ply as Score
    } else {
        score
    }
}

/// Inverse of `adjust_mate_from_storage`: converts a root-relative mate
/// score into one relative to the node being stored, so it reads correctly
/// no matter what ply it's probed back in at.
fn adjust_mate_for_storage(score: Score, ply: usize) -> Score {
    if score > MATE_VALUE - 100 {
        score + ply as Score
    } else if score < -MATE_VALUE + 100 {
        score - ply as Score
    } else {
        score
    }
}

//! Conversation Memory
//!
//! Bounded history of answered questions for one session. Only the final
//! query, answer and cost of each turn are kept; plans and tasks are dropped
//! when the query finishes.

use crate::conductor::types::ConversationTurn;
use std::collections::VecDeque;

/// Default number of turns kept per session
pub const DEFAULT_MAX_TURNS: usize = 8;

/// Ring buffer of conversation turns, oldest evicted first
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ConversationMemory {
    /// Create a memory holding at most `capacity` turns (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a turn, evicting the oldest one when full
    pub fn record(&mut self, turn: ConversationTurn) {
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// The last `n` turns in chronological order
    pub fn context_window(&self, n: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// All turns in chronological order
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(n: usize) -> ConversationTurn {
        ConversationTurn::new(format!("q{}", n), format!("a{}", n), 0.01)
    }

    #[test]
    fn test_record_evicts_oldest() {
        let mut memory = ConversationMemory::new(2);
        memory.record(turn(1));
        memory.record(turn(2));
        memory.record(turn(3));

        let turns = memory.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].query, "q2");
        assert_eq!(turns[1].query, "q3");
    }

    #[test]
    fn test_context_window_is_chronological_tail() {
        let mut memory = ConversationMemory::new(8);
        for i in 1..=5 {
            memory.record(turn(i));
        }

        let window = memory.context_window(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].query, "q4");
        assert_eq!(window[1].query, "q5");

        assert_eq!(memory.context_window(0).len(), 0);
        assert_eq!(memory.context_window(50).len(), 5);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut memory = ConversationMemory::new(0);
        assert_eq!(memory.capacity(), 1);
        memory.record(turn(1));
        memory.record(turn(2));
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.turns()[0].answer, "a2");
    }

    #[test]
    fn test_clear() {
        let mut memory = ConversationMemory::default();
        memory.record(turn(1));
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.capacity(), DEFAULT_MAX_TURNS);
    }
}

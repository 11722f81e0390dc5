//! Knuth-Fisher-Yates non-repeating shuffle deck (spec §4.A).
//!
//! Grounded on `original_source/.../media-player/kfy.c`. The C source's
//! `kfy_shuffle` reads `_a[k->end]` with a `k` that isn't in scope in
//! that function — the Open Questions section flags this as a bug and
//! nominates the algorithm below (decrement first, draw from `[0,
//! end)`, swap the drawn index into the freed slot) as authoritative.

use rand::Rng;

const MIN_CAPACITY: usize = 8;

fn next_pow_2(val: usize) -> usize {
    let mut ret = MIN_CAPACITY;
    while ret <= val {
        ret <<= 1;
    }
    ret
}

/// A capacity-backed array of `[0, size)` with a moving boundary
/// `end`; `draw` hands out each index exactly once per cycle.
pub struct Deck {
    slots: Vec<usize>,
    end: usize,
    size: usize,
    rng: rand::rngs::ThreadRng,
}

impl Deck {
    pub fn new(size: usize) -> Self {
        let cap = next_pow_2(size);
        let mut slots = Vec::with_capacity(cap);
        slots.extend(0..size);
        Deck {
            slots,
            end: size,
            size,
            rng: rand::rng(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cycle_done(&self) -> bool {
        self.end == 0
    }

    /// Restore canonical contents and `end = size`, shrinking capacity
    /// back down if the deck has drained to a quarter of it.
    pub fn reset(&mut self) {
        let cap = self.slots.capacity();
        if self.size < cap / 4 && self.size >= MIN_CAPACITY {
            let new_cap = next_pow_2(self.size);
            self.slots.shrink_to(new_cap);
        }
        self.slots.clear();
        self.slots.extend(0..self.size);
        self.end = self.size;
    }

    /// Returns the next unvisited index, resetting first if the
    /// previous cycle had already completed.
    pub fn draw(&mut self) -> usize {
        if self.end == 0 {
            self.reset();
        }

        self.end -= 1;
        let index = self.rng.random_range(0..=self.end);

        let val = self.slots[index];
        self.slots[index] = self.slots[self.end];
        self.slots[self.end] = val;

        val
    }

    pub fn add(&mut self, count: usize) {
        let new_size = self.size + count;
        let new_end = self.end + count;

        if new_size > self.slots.capacity() {
            let new_cap = next_pow_2(new_size);
            self.slots.reserve(new_cap - self.slots.len());
        }

        for i in self.end..new_end {
            self.slots.insert(i, self.size + i - self.end);
        }

        self.size = new_size;
        self.end = new_end;
    }

    pub fn remove(&mut self, count: usize) {
        assert!(count <= self.size, "remove count exceeds deck size");

        if count == 0 {
            return;
        }

        self.end = self.end.saturating_sub(count);
        self.size -= count;
        self.slots.truncate(self.size);
        for (i, slot) in self.slots.iter_mut().enumerate().take(self.end) {
            *slot = i;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn one_cycle_draws_every_index_exactly_once() {
        let mut deck = Deck::new(7);
        let mut seen = HashSet::new();
        for _ in 0..7 {
            assert!(seen.insert(deck.draw()));
        }
        assert_eq!(seen, (0..7).collect());
        assert!(deck.cycle_done());
    }

    #[test]
    fn draw_past_a_cycle_resets_and_keeps_going() {
        let mut deck = Deck::new(3);
        let mut total = Vec::new();
        for _ in 0..6 {
            total.push(deck.draw());
        }
        let (first, second) = total.split_at(3);
        let first: HashSet<_> = first.iter().copied().collect();
        let second: HashSet<_> = second.iter().copied().collect();
        assert_eq!(first, (0..3).collect());
        assert_eq!(second, (0..3).collect());
    }

    #[test]
    fn add_grows_size_and_new_indices_are_drawable() {
        let mut deck = Deck::new(2);
        deck.add(3);
        assert_eq!(deck.size(), 5);
        let mut seen = HashSet::new();
        while !deck.cycle_done() {
            seen.insert(deck.draw());
        }
        assert_eq!(seen, (0..5).collect());
    }

    #[test]
    fn remove_shrinks_size_and_clamps_end() {
        let mut deck = Deck::new(4);
        deck.draw();
        deck.draw();
        // end == 2 now; removing 3 should clamp end to 0, not underflow.
        deck.remove(3);
        assert_eq!(deck.size(), 1);
        assert!(deck.cycle_done());
    }

    #[test]
    fn new_deck_has_capacity_floor_of_eight() {
        let deck = Deck::new(1);
        assert!(deck.slots.capacity() >= MIN_CAPACITY);
    }
}

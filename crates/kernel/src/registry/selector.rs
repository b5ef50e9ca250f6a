use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_OPTION_COUNT: usize = 4;

/// Deals indices `0..option_count` in shuffled rounds and never hands out the
/// same index twice in a row, unless there is only one option.
#[derive(Debug, Clone)]
pub struct NonRepeatingSelector {
    option_count: usize,
    queue: VecDeque<usize>,
    last_dispatched: Option<usize>,
    rng: StdRng,
}

impl NonRepeatingSelector {
    pub fn new(option_count: usize, seed: u64) -> Self {
        Self {
            option_count: option_count.max(1),
            queue: VecDeque::with_capacity(option_count.max(1)),
            last_dispatched: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn option_count(&self) -> usize {
        self.option_count
    }

    pub fn last_dispatched(&self) -> Option<usize> {
        self.last_dispatched
    }

    pub fn next_index(&mut self) -> usize {
        if self.queue.is_empty() {
            self.reshuffle();
            if self.queue.len() > 1 && self.queue.front().copied() == self.last_dispatched {
                self.queue.rotate_left(1);
            }
        }
        // The queue was refilled above, so it always holds at least one index.
        let index = self.queue.pop_front().unwrap_or(0);
        self.last_dispatched = Some(index);
        index
    }

    /// Fisher-Yates over `0..option_count`.
    fn reshuffle(&mut self) {
        let mut order: Vec<usize> = (0..self.option_count).collect();
        for i in (1..order.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            order.swap(i, j);
        }
        self.queue.extend(order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_repeats_back_to_back() {
        for seed in 0..64 {
            let mut selector = NonRepeatingSelector::new(DEFAULT_OPTION_COUNT, seed);
            let mut previous = selector.next_index();
            for _ in 0..200 {
                let next = selector.next_index();
                assert_ne!(previous, next, "seed {seed} repeated {next}");
                previous = next;
            }
        }
    }

    #[test]
    fn every_round_of_four_is_a_permutation() {
        for seed in 0..32 {
            let mut selector = NonRepeatingSelector::new(DEFAULT_OPTION_COUNT, seed);
            for _ in 0..25 {
                let mut round: Vec<usize> = (0..4).map(|_| selector.next_index()).collect();
                round.sort_unstable();
                assert_eq!(round, vec![0, 1, 2, 3], "seed {seed}");
            }
        }
    }

    #[test]
    fn single_option_repeats() {
        let mut selector = NonRepeatingSelector::new(1, 7);
        assert_eq!(selector.next_index(), 0);
        assert_eq!(selector.next_index(), 0);
        assert_eq!(selector.last_dispatched(), Some(0));
    }

    #[test]
    fn zero_options_behaves_as_one() {
        let mut selector = NonRepeatingSelector::new(0, 7);
        assert_eq!(selector.option_count(), 1);
        assert_eq!(selector.next_index(), 0);
    }

    #[test]
    fn same_seed_gives_same_sequence() {
        let mut left = NonRepeatingSelector::new(DEFAULT_OPTION_COUNT, 42);
        let mut right = NonRepeatingSelector::new(DEFAULT_OPTION_COUNT, 42);
        let left_seq: Vec<usize> = (0..16).map(|_| left.next_index()).collect();
        let right_seq: Vec<usize> = (0..16).map(|_| right.next_index()).collect();
        assert_eq!(left_seq, right_seq);
    }
}

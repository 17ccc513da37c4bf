use serde::{Deserialize, Serialize};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

pub const HISTORY_CAPACITY: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: Price,
    pub timestamp: Timestamp,
}

impl Default for PricePoint {
    fn default() -> Self {
        PricePoint {
            price: Price::zero(),
            timestamp: Timestamp::from_secs(0),
        }
    }
}

/// Fixed-capacity ring buffer of accepted prices. Once full, each push
/// overwrites the oldest slot (FIFO).
#[derive(Clone, Debug)]
pub struct PriceHistory<const N: usize = HISTORY_CAPACITY> {
    slots: [PricePoint; N],
    head: usize,  // index of the oldest entry
    len: usize,
}

impl<const N: usize> PriceHistory<N> {
    pub fn new() -> Self {
        PriceHistory {
            slots: [PricePoint::default(); N],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, point: PricePoint) {
        if N == 0 {
            return;
        }
        if self.len < N {
            self.slots[(self.head + self.len) % N] = point;
            self.len += 1;
        } else {
            self.slots[self.head] = point;
            self.head = (self.head + 1) % N;
        }
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = PricePoint> + '_ {
        (0..self.len).map(move |i| self.slots[(self.head + i) % N])
    }

    pub fn latest(&self) -> Option<PricePoint> {
        if self.len == 0 {
            return None;
        }
        Some(self.slots[(self.head + self.len - 1) % N])
    }

    /// Oldest entry recorded at or after `cutoff`.
    pub fn oldest_since(&self, cutoff: Timestamp) -> Option<PricePoint> {
        self.iter().find(|p| p.timestamp >= cutoff)
    }

    pub fn to_vec(&self) -> Vec<PricePoint> {
        self.iter().collect()
    }
}

impl<const N: usize> Default for PriceHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(units: i64, secs: u64) -> PricePoint {
        PricePoint {
            price: Price::from_units(units),
            timestamp: Timestamp::from_secs(secs),
        }
    }

    #[test]
    fn fills_then_evicts_oldest_first() {
        let mut history: PriceHistory<3> = PriceHistory::new();
        assert!(history.is_empty());
        assert_eq!(history.latest(), None);

        history.push(point(1, 1));
        history.push(point(2, 2));
        history.push(point(3, 3));
        assert_eq!(history.len(), 3);

        history.push(point(4, 4));
        history.push(point(5, 5));

        let prices: Vec<_> = history.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![Price::from_units(3), Price::from_units(4), Price::from_units(5)]);
        assert_eq!(history.latest(), Some(point(5, 5)));
    }

    #[test]
    fn oldest_since_respects_cutoff() {
        let mut history: PriceHistory = PriceHistory::new();
        history.push(point(100, 10));
        history.push(point(101, 70));
        history.push(point(102, 130));

        assert_eq!(history.oldest_since(Timestamp::from_secs(60)), Some(point(101, 70)));
        assert_eq!(history.oldest_since(Timestamp::from_secs(0)), Some(point(100, 10)));
        assert_eq!(history.oldest_since(Timestamp::from_secs(131)), None);
    }

    #[test]
    fn default_capacity_is_one_hundred() {
        let mut history: PriceHistory = PriceHistory::default();
        for i in 0..250 {
            history.push(point(i + 1, i as u64));
        }
        assert_eq!(history.capacity(), HISTORY_CAPACITY);
        assert_eq!(history.len(), 100);
        assert_eq!(history.iter().next(), Some(point(151, 150)));
        assert_eq!(history.latest(), Some(point(250, 249)));
    }
}

use crate::config::RESERVOIR_EARLY_STOP_FACTOR;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// Keep the first `capacity` items, then stop
    #[default]
    Head,
    /// Uniform single-pass sample over a stream of unknown length
    Reservoir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Appended,
    Replaced { slot: usize },
    Rejected,
}

impl Admission {
    pub fn admitted(&self) -> bool {
        !matches!(self, Admission::Rejected)
    }
}

/// Bounded sample of a stream. Never holds more than `capacity` items.
pub struct Sampler<T> {
    mode: SamplingMode,
    capacity: usize,
    items: Vec<T>,
    seen: u64,
    replacements: u64,
    early_stop_factor: Option<u64>,
    rng: StdRng,
}

impl<T> Sampler<T> {
    pub fn new(mode: SamplingMode, capacity: usize) -> Self {
        Self {
            mode,
            capacity,
            items: Vec::with_capacity(capacity.min(1 << 16)),
            seen: 0,
            replacements: 0,
            early_stop_factor: Some(RESERVOIR_EARLY_STOP_FACTOR),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    /// Reservoir mode stops once `seen >= capacity * factor`; `None` reads to the end.
    pub fn with_early_stop(mut self, factor: Option<u64>) -> Self {
        self.early_stop_factor = factor;
        self
    }

    /// Offers the next valid item of the stream.
    pub fn offer(&mut self, item: T) -> Admission {
        match self.mode {
            SamplingMode::Head => {
                if self.items.len() < self.capacity {
                    self.seen += 1;
                    self.items.push(item);
                    Admission::Appended
                } else {
                    Admission::Rejected
                }
            }
            SamplingMode::Reservoir => {
                self.seen += 1;
                if self.items.len() < self.capacity {
                    self.items.push(item);
                    return Admission::Appended;
                }
                let j = self.rng.gen_range(0..self.seen);
                if j < self.capacity as u64 {
                    let slot = j as usize;
                    self.items[slot] = item;
                    self.replacements += 1;
                    Admission::Replaced { slot }
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    /// True once offering more items is pointless (head full, or reservoir early stop).
    pub fn is_exhausted(&self) -> bool {
        match self.mode {
            SamplingMode::Head => self.items.len() >= self.capacity,
            SamplingMode::Reservoir => self
                .early_stop_factor
                .is_some_and(|factor| self.seen >= (self.capacity as u64).saturating_mul(factor)),
        }
    }

    /// How many more valid items can be offered before [`is_exhausted`] turns
    /// true, or `None` when the sampler reads to the end of the stream.
    ///
    /// [`is_exhausted`]: Sampler::is_exhausted
    pub fn remaining(&self) -> Option<u64> {
        match self.mode {
            SamplingMode::Head => Some(self.capacity.saturating_sub(self.items.len()) as u64),
            SamplingMode::Reservoir => self.early_stop_factor.map(|factor| {
                (self.capacity as u64)
                    .saturating_mul(factor)
                    .saturating_sub(self.seen)
            }),
        }
    }

    /// Valid items offered and counted so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn replacements(&self) -> u64 {
        self.replacements
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_keeps_first_items() {
        let mut s = Sampler::new(SamplingMode::Head, 3);
        let admissions: Vec<_> = (0..5).map(|i| s.offer(i)).collect();
        assert_eq!(s.items(), &[0, 1, 2]);
        assert!(admissions[..3].iter().all(Admission::admitted));
        assert_eq!(admissions[3], Admission::Rejected);
        assert!(s.is_exhausted());
    }

    #[test]
    fn head_not_exhausted_until_full() {
        let mut s = Sampler::new(SamplingMode::Head, 2);
        s.offer("a");
        assert!(!s.is_exhausted());
        s.offer("b");
        assert!(s.is_exhausted());
    }

    #[test]
    fn reservoir_fills_before_replacing() {
        let mut s = Sampler::new(SamplingMode::Reservoir, 4).with_seed(7);
        for i in 0..4 {
            assert_eq!(s.offer(i), Admission::Appended);
        }
        assert_eq!(s.items(), &[0, 1, 2, 3]);
        assert_eq!(s.replacements(), 0);
    }

    #[test]
    fn reservoir_never_exceeds_capacity() {
        let mut s = Sampler::new(SamplingMode::Reservoir, 5)
            .with_seed(1)
            .with_early_stop(None);
        for i in 0..1_000 {
            s.offer(i);
            assert!(s.len() <= 5);
        }
        assert_eq!(s.seen(), 1_000);
        assert!(s.replacements() > 0);
    }

    #[test]
    fn reservoir_replacement_slot_holds_item() {
        let mut s = Sampler::new(SamplingMode::Reservoir, 2)
            .with_seed(3)
            .with_early_stop(None);
        s.offer(0);
        s.offer(1);
        for i in 2..100 {
            if let Admission::Replaced { slot } = s.offer(i) {
                assert_eq!(s.items()[slot], i);
            }
        }
    }

    #[test]
    fn reservoir_early_stop() {
        let mut s = Sampler::new(SamplingMode::Reservoir, 2).with_seed(9);
        let mut offered = 0;
        while !s.is_exhausted() {
            s.offer(offered);
            offered += 1;
        }
        assert_eq!(offered, 2 * RESERVOIR_EARLY_STOP_FACTOR);
    }

    #[test]
    fn remaining_counts_down_to_exhaustion() {
        let mut head = Sampler::new(SamplingMode::Head, 3);
        assert_eq!(head.remaining(), Some(3));
        head.offer('a');
        assert_eq!(head.remaining(), Some(2));

        let mut res = Sampler::new(SamplingMode::Reservoir, 2).with_seed(4);
        assert_eq!(res.remaining(), Some(2 * RESERVOIR_EARLY_STOP_FACTOR));
        while res.remaining() != Some(0) {
            res.offer(0);
        }
        assert!(res.is_exhausted());

        let open = Sampler::<u8>::new(SamplingMode::Reservoir, 2).with_early_stop(None);
        assert_eq!(open.remaining(), None);
    }

    #[test]
    fn reservoir_without_early_stop_never_exhausts() {
        let mut s = Sampler::new(SamplingMode::Reservoir, 1).with_early_stop(None);
        for i in 0..100 {
            s.offer(i);
        }
        assert!(!s.is_exhausted());
    }

    #[test]
    fn zero_capacity() {
        let mut head = Sampler::new(SamplingMode::Head, 0);
        assert!(head.is_exhausted());
        assert_eq!(head.offer(1), Admission::Rejected);

        let mut res = Sampler::new(SamplingMode::Reservoir, 0).with_early_stop(None);
        assert_eq!(res.offer(1), Admission::Rejected);
        assert!(res.is_empty());
    }

    #[test]
    fn same_seed_same_sample() {
        let run = |seed| {
            let mut s = Sampler::new(SamplingMode::Reservoir, 3)
                .with_seed(seed)
                .with_early_stop(None);
            for i in 0..50 {
                s.offer(i);
            }
            s.into_items()
        };
        assert_eq!(run(42), run(42));
    }
}

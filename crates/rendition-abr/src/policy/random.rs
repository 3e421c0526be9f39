use super::{Candidates, Decision, SelectionPolicy};
use crate::{SelectionReason, Telemetry, Xorshift64};

/// Picks a uniformly random eligible candidate on every update.
///
/// Meant for testing the rest of the pipeline under constant switching.
/// Draws come from a seeded xorshift generator, so a given seed always
/// produces the same sequence of choices.
#[derive(Clone, Debug)]
pub struct RandomPolicy {
    rng: Xorshift64,
}

impl RandomPolicy {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xorshift64::new(seed),
        }
    }

    fn pick(&mut self, candidates: &Candidates<'_>) -> usize {
        let count = candidates.eligible_count();
        if count == 0 {
            return candidates.lowest_eligible();
        }
        let nth = self.rng.index(count);
        candidates
            .eligible()
            .nth(nth)
            .map_or_else(|| candidates.lowest_eligible(), |(i, _)| i)
    }
}

impl SelectionPolicy for RandomPolicy {
    fn decide(
        &mut self,
        candidates: &Candidates<'_>,
        current: Option<usize>,
        _telemetry: &Telemetry,
    ) -> Decision {
        let index = self.pick(candidates);
        let reason = if current.is_some() {
            SelectionReason::Adaptive
        } else {
            SelectionReason::Initial
        };
        Decision::new(index, reason)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{super::telemetry, *};
    use crate::Format;

    fn formats() -> Vec<Arc<Format>> {
        (1..=5)
            .rev()
            .map(|b| Arc::new(Format::new(b * 100_000)))
            .collect()
    }

    #[test]
    fn same_seed_same_sequence() {
        let formats = formats();
        let mask = vec![true; 5];
        let c = Candidates::new(&formats, &mask);

        let mut a = RandomPolicy::new(42);
        let mut b = RandomPolicy::new(42);
        let seq_a: Vec<usize> = (0..32)
            .map(|_| a.decide(&c, Some(0), &telemetry(0, 0)).index)
            .collect();
        let seq_b: Vec<usize> = (0..32)
            .map(|_| b.decide(&c, Some(0), &telemetry(0, 0)).index)
            .collect();
        assert_eq!(seq_a, seq_b);
        assert!(seq_a.iter().any(|i| *i != seq_a[0]), "should vary");
    }

    #[test]
    fn only_eligible_candidates_are_picked() {
        let formats = formats();
        let mask = vec![false, true, false, true, false];
        let c = Candidates::new(&formats, &mask);
        let mut policy = RandomPolicy::new(0);

        for _ in 0..64 {
            let d = policy.decide(&c, Some(1), &telemetry(0, 0));
            assert!(mask[d.index]);
            assert_eq!(d.reason, SelectionReason::Adaptive);
        }
        assert_eq!(policy.initial(&c, &telemetry(0, 0)).reason, SelectionReason::Initial);
    }
}

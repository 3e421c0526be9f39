#![forbid(unsafe_code)]

/// Per-candidate exclusion timers, indexed by selection index.
///
/// Expiry times are clock milliseconds, so they keep running while the owning
/// selection is disabled.
#[derive(Clone, Debug)]
pub struct Blacklist {
    until_ms: Vec<Option<u64>>,
}

impl Blacklist {
    #[must_use]
    pub fn new(length: usize) -> Self {
        Self {
            until_ms: vec![None; length],
        }
    }

    #[must_use]
    pub fn is_blacklisted(&self, index: usize, now_ms: u64) -> bool {
        matches!(self.until_ms.get(index), Some(Some(until)) if *until > now_ms)
    }

    /// Expiry of the entry at `index`, if it is still active at `now_ms`.
    #[must_use]
    pub fn blacklisted_until(&self, index: usize, now_ms: u64) -> Option<u64> {
        self.until_ms
            .get(index)
            .copied()
            .flatten()
            .filter(|until| *until > now_ms)
    }

    #[must_use]
    pub fn eligible_count(&self, now_ms: u64) -> usize {
        (0..self.until_ms.len())
            .filter(|i| !self.is_blacklisted(*i, now_ms))
            .count()
    }

    /// Drop expired entries and write the eligibility mask into `out`.
    pub fn refresh(&mut self, now_ms: u64, out: &mut Vec<bool>) {
        out.clear();
        for until in &mut self.until_ms {
            if until.is_some_and(|t| t <= now_ms) {
                *until = None;
            }
            out.push(until.is_none());
        }
    }

    /// Exclude `index` until `now_ms + duration_ms`.
    ///
    /// Refuses (returns `false`, nothing changes) when `index` is the last
    /// eligible candidate. An existing longer exclusion is never shortened.
    pub fn try_blacklist(&mut self, index: usize, duration_ms: u64, now_ms: u64) -> bool {
        if index >= self.until_ms.len() {
            return false;
        }
        let can_blacklist = self.is_blacklisted(index, now_ms)
            || (0..self.until_ms.len()).any(|i| i != index && !self.is_blacklisted(i, now_ms));
        if !can_blacklist {
            return false;
        }

        let until = now_ms.saturating_add(duration_ms);
        let entry = &mut self.until_ms[index];
        *entry = Some(entry.map_or(until, |existing| existing.max(until)));
        true
    }
}

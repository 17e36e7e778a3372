/// Whether the composited surface still matches the cell data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Clean,
    Dirty,
}

/// Single dirty flag for a whole buffer, plus a count of composite passes.
///
/// The flag is derived from the store revision: a buffer is clean only when
/// its last composite saw the store's current revision. Store writes can
/// only make it dirty; only the owning buffer records composites.
#[derive(Debug, Clone, Default)]
pub struct UpdateScheduler {
    composited: Option<u64>,
    composites: u64,
}

impl UpdateScheduler {
    /// Starts dirty so the first draw always composites.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, revision: u64) -> UpdateState {
        if self.composited == Some(revision) {
            UpdateState::Clean
        } else {
            UpdateState::Dirty
        }
    }

    pub fn is_dirty(&self, revision: u64) -> bool {
        self.state(revision) == UpdateState::Dirty
    }

    /// Forces the next draw to composite, e.g. after an atlas swap.
    pub fn mark_dirty(&mut self) {
        self.composited = None;
    }

    /// Records a finished upload-and-composite pass of `revision`.
    pub fn finish_composite(&mut self, revision: u64) {
        self.composited = Some(revision);
        self.composites += 1;
    }

    /// Number of composite passes run so far.
    pub fn composite_count(&self) -> u64 {
        self.composites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_between_clean_and_dirty() {
        let mut s = UpdateScheduler::new();
        assert_eq!(s.state(0), UpdateState::Dirty);

        s.finish_composite(0);
        assert_eq!(s.state(0), UpdateState::Clean);
        assert_eq!(s.composite_count(), 1);

        // two mutations, one composite
        assert!(s.is_dirty(2));
        s.finish_composite(2);
        assert!(!s.is_dirty(2));
        assert_eq!(s.composite_count(), 2);
    }

    #[test]
    fn mark_dirty_overrides_a_matching_revision() {
        let mut s = UpdateScheduler::new();
        s.finish_composite(5);
        s.mark_dirty();
        assert!(s.is_dirty(5));
    }
}

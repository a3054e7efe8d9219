//! Engine tuning knobs.

/// Runtime configuration for the hierarchy engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on units visited by one traversal.
    ///
    /// `None` uses the current forest size, which no valid traversal exceeds.
    pub max_visited: Option<usize>,
}

impl EngineConfig {
    /// Config with an explicit traversal bound.
    pub fn with_max_visited(max_visited: usize) -> Self {
        Self {
            max_visited: Some(max_visited),
        }
    }

    /// Resolves the traversal bound for a forest of `forest_len` units.
    pub fn traversal_limit(&self, forest_len: usize) -> usize {
        self.max_visited.unwrap_or(forest_len)
    }
}

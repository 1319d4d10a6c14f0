//! Public result and configuration types for the hybrid search pipeline.

/// Tunable weights and thresholds for the fusion pipeline.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub lex_weight: f64,
    pub sem_weight: f64,
    /// Minimum cosine similarity for a chunk to count toward a session's
    /// semantic score.
    pub cosine_floor: f64,
    /// Minimum combined score for a session to survive fusion.
    pub combined_floor: f64,
    /// Floor of the min-max normalization range; results never normalize
    /// below this, so near-duplicate top hits don't collapse toward zero.
    pub normalization_floor: f64,
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lex_weight: 0.3,
            sem_weight: 0.7,
            cosine_floor: 0.35,
            combined_floor: 0.2,
            normalization_floor: 0.5,
            default_limit: 50,
        }
    }
}

/// One fused result. `lex_score`/`sem_score` are the per-pass normalized
/// scores that fed `combined_score`; either may be absent if that pass
/// didn't surface the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub session_id: String,
    pub combined_score: f64,
    pub lex_score: Option<f64>,
    pub sem_score: Option<f64>,
}

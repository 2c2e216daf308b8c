use serde::{Deserialize, Serialize};

/// Default upper bound on how far in the future a deadline may be set (30 days).
pub const DEFAULT_MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Who may submit the outcome of an active wager.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// The arbiter resolves when one is named, otherwise both parties co-sign.
    #[default]
    ArbiterOrMutual,
    /// Every wager must name an arbiter and only the arbiter resolves.
    ArbiterOnly,
    /// No arbiters; creator and counterparty must co-sign the outcome.
    MutualOnly,
}

/// Execution rules handed to every `Layer`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub resolution: ResolutionPolicy,
    /// Whether `Outcome::Draw` is accepted.
    pub allow_draws: bool,
    pub max_duration_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            resolution: ResolutionPolicy::default(),
            allow_draws: true,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

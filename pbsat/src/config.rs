//! Solver configuration.

use serde::{Deserialize, Serialize};

/// Initial polarity used for a variable that hasn't been assigned a value before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialPolarity {
    /// Prefer assigning false.
    False,
    /// Prefer assigning true.
    True,
    /// Pick a polarity uniformly at random, once, when the variable is first decided.
    Random,
    /// Prefer the sign the variable occurs with more often, weighted by occurrence count, across
    /// every clause and constraint added so far.
    WeightedSign,
    /// The opposite of `WeightedSign`.
    ReverseWeightedSign,
}

/// Variable order used to pick the next branching variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableOrder {
    /// Branch on the variable with the highest VSIDS activity.
    Vsids,
    /// Branch on unassigned variables in index order.
    InOrder,
    /// Branch on a uniformly random unassigned variable.
    Random,
}

/// Clause minimization strategy used during conflict analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinimizationAlgorithm {
    /// Perform no minimization.
    None,
    /// Only remove literals that are redundant against a single reason clause.
    Simple,
    /// Perform the full recursive minimization described in `analyze_conflict`.
    Recursive,
    /// Run `Simple` first, then `Recursive` on whatever it leaves behind.
    Experimental,
}

/// Binary-clause-based minimization strategy applied to a learned clause, on top of whatever
/// `minimization_algorithm` already removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryMinimizationAlgorithm {
    /// Perform no binary clause minimization.
    None,
    /// Minimize against the binary implication graph before the general minimizer runs, so it can
    /// take advantage of the literals this proves redundant.
    First,
    /// Minimize against the binary implication graph after the general minimizer runs.
    Reachability,
    /// Like `Reachability`, but follows the implication graph transitively instead of stopping
    /// after one hop.
    Experimental,
}

/// Configurable parameters used during solving.
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    /// Multiplicative decay for the VSIDS decision heuristic. (Default: 0.95)
    pub variable_activity_decay: f32,

    /// Multiplicative decay for clause activities. (Default: 0.999)
    pub clause_activity_decay: f32,

    /// Polarity preferred for a variable that was never assigned before. (Default: False)
    pub initial_polarity: InitialPolarity,

    /// Whether to prefer a variable's last assigned value over `initial_polarity` on
    /// subsequent decisions. (Default: true)
    pub use_phase_saving: bool,

    /// Order used to pick the next branching variable. (Default: Vsids)
    pub preferred_variable_order: VariableOrder,

    /// Fraction of decisions that pick a uniformly random variable instead of following
    /// `preferred_variable_order`. (Default: 0.0)
    pub random_branches_ratio: f64,

    /// Fraction of decisions that pick a uniformly random polarity instead of the preferred
    /// one. (Default: 0.0)
    pub random_polarity_ratio: f64,

    /// Scaling factor for Luby sequence based restarts (number of conflicts). (Default: 128)
    pub restart_period: u64,

    /// Clause minimization algorithm applied to learned clauses. (Default: Recursive)
    pub minimization_algorithm: MinimizationAlgorithm,

    /// Binary clause minimization strategy applied to learned clauses. (Default: Reachability)
    pub binary_minimization_algorithm: BinaryMinimizationAlgorithm,

    /// Whether binary clauses are kept in a dedicated structure instead of the general clause
    /// database. (Default: true)
    pub treat_binary_clauses_separately: bool,

    /// Whether conflicts involving pseudo-Boolean constraints are resolved by PB cancellation
    /// instead of being decomposed into clausal conflicts. (Default: true)
    pub use_pb_resolution: bool,

    /// Whether to use the glue level (LBD) to tier learned clauses. (Default: true)
    pub use_lbd: bool,

    /// Whether to bump the activity of a clause a second time when its glue level improves.
    /// (Default: false)
    pub use_glucose_bump_again_strategy: bool,

    /// Amount `clause_activity_decay` is increased by every
    /// `glucose_decay_increment_period` conflicts. (Default: 0.01)
    pub glucose_decay_increment: f32,

    /// Number of conflicts between increments of `clause_activity_decay`. (Default: 5000)
    pub glucose_decay_increment_period: u64,

    /// Upper bound `clause_activity_decay` is clamped to while increasing. (Default: 0.95)
    pub glucose_max_decay: f32,

    /// Whether PB conflict resolution reduces constraint coefficients to keep the slack at
    /// zero, instead of only cancelling the conflicting literal. (Default: true)
    pub minimize_reduction_during_pb_resolution: bool,

    /// Target ratio of learned to problem clauses used by the clause cleanup schedule.
    /// (Default: 0.5)
    pub clause_cleanup_ratio: f64,

    /// Amount the target learned clause count grows by on every cleanup. (Default: 1000)
    pub clause_cleanup_increment: u64,

    /// Number of conflicts between local clause reductions. (Default: 15000)
    pub reduce_locals_interval: u64,

    /// Number of conflicts between mid clause reductions. (Default: 10000)
    pub reduce_mids_interval: u64,

    /// Stop searching after this many conflicts. (Default: None, unlimited)
    pub max_number_of_conflicts: Option<u64>,

    /// Stop searching after this much wall-clock time. (Default: None, unlimited)
    pub max_time_in_seconds: Option<f64>,

    /// Approximate upper bound on memory used by the clause database. (Default: None,
    /// unlimited)
    pub max_memory_in_mb: Option<u64>,

    /// Whether to retain enough information to extract an unsat core on `Unsat`. (Default:
    /// false)
    pub unsat_proof: bool,

    /// Whether decision levels introduced only to enqueue assumptions count towards a learned
    /// clause's glue level. (Default: false)
    pub count_assumption_levels_in_lbd: bool,

    /// Whether to log search progress via the `log` crate. (Default: false)
    pub log_search_progress: bool,

    /// Seed for all random choices made by the solver. (Default: 0)
    pub random_seed: u64,
}

impl Default for SolverConfig {
    fn default() -> SolverConfig {
        SolverConfig {
            variable_activity_decay: 0.95,
            clause_activity_decay: 0.999,
            initial_polarity: InitialPolarity::False,
            use_phase_saving: true,
            preferred_variable_order: VariableOrder::Vsids,
            random_branches_ratio: 0.0,
            random_polarity_ratio: 0.0,
            restart_period: 128,
            minimization_algorithm: MinimizationAlgorithm::Recursive,
            binary_minimization_algorithm: BinaryMinimizationAlgorithm::Reachability,
            treat_binary_clauses_separately: true,
            use_pb_resolution: true,
            use_lbd: true,
            use_glucose_bump_again_strategy: false,
            glucose_decay_increment: 0.01,
            glucose_decay_increment_period: 5000,
            glucose_max_decay: 0.95,
            minimize_reduction_during_pb_resolution: true,
            clause_cleanup_ratio: 0.5,
            clause_cleanup_increment: 1000,
            reduce_locals_interval: 15000,
            reduce_mids_interval: 10000,
            max_number_of_conflicts: None,
            max_time_in_seconds: None,
            max_memory_in_mb: None,
            unsat_proof: false,
            count_assumption_levels_in_lbd: false,
            log_search_progress: false,
            random_seed: 0,
        }
    }
}

/// A partial update applied to a [`SolverConfig`].
///
/// Fields left as `None` keep the current value. Applying the same update twice has the same
/// effect as applying it once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfigUpdate {
    pub variable_activity_decay: Option<f32>,
    pub clause_activity_decay: Option<f32>,
    pub initial_polarity: Option<InitialPolarity>,
    pub use_phase_saving: Option<bool>,
    pub preferred_variable_order: Option<VariableOrder>,
    pub random_branches_ratio: Option<f64>,
    pub random_polarity_ratio: Option<f64>,
    pub restart_period: Option<u64>,
    pub minimization_algorithm: Option<MinimizationAlgorithm>,
    pub binary_minimization_algorithm: Option<BinaryMinimizationAlgorithm>,
    pub treat_binary_clauses_separately: Option<bool>,
    pub use_pb_resolution: Option<bool>,
    pub use_lbd: Option<bool>,
    pub use_glucose_bump_again_strategy: Option<bool>,
    pub glucose_decay_increment: Option<f32>,
    pub glucose_decay_increment_period: Option<u64>,
    pub glucose_max_decay: Option<f32>,
    pub minimize_reduction_during_pb_resolution: Option<bool>,
    pub clause_cleanup_ratio: Option<f64>,
    pub clause_cleanup_increment: Option<u64>,
    pub reduce_locals_interval: Option<u64>,
    pub reduce_mids_interval: Option<u64>,
    pub max_number_of_conflicts: Option<Option<u64>>,
    pub max_time_in_seconds: Option<Option<f64>>,
    pub max_memory_in_mb: Option<Option<u64>>,
    pub unsat_proof: Option<bool>,
    pub count_assumption_levels_in_lbd: Option<bool>,
    pub log_search_progress: Option<bool>,
    pub random_seed: Option<u64>,
}

impl SolverConfigUpdate {
    /// Combine this update with a later one, with `other`'s set fields taking precedence.
    pub fn merge(&mut self, other: SolverConfigUpdate) {
        macro_rules! merge {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }

        merge!(variable_activity_decay);
        merge!(clause_activity_decay);
        merge!(initial_polarity);
        merge!(use_phase_saving);
        merge!(preferred_variable_order);
        merge!(random_branches_ratio);
        merge!(random_polarity_ratio);
        merge!(restart_period);
        merge!(minimization_algorithm);
        merge!(binary_minimization_algorithm);
        merge!(treat_binary_clauses_separately);
        merge!(use_pb_resolution);
        merge!(use_lbd);
        merge!(use_glucose_bump_again_strategy);
        merge!(glucose_decay_increment);
        merge!(glucose_decay_increment_period);
        merge!(glucose_max_decay);
        merge!(minimize_reduction_during_pb_resolution);
        merge!(clause_cleanup_ratio);
        merge!(clause_cleanup_increment);
        merge!(reduce_locals_interval);
        merge!(reduce_mids_interval);
        merge!(max_number_of_conflicts);
        merge!(max_time_in_seconds);
        merge!(max_memory_in_mb);
        merge!(unsat_proof);
        merge!(count_assumption_levels_in_lbd);
        merge!(log_search_progress);
        merge!(random_seed);
    }

    /// Apply this update to a configuration, leaving unset fields unchanged.
    pub fn apply_to(&self, config: &mut SolverConfig) {
        macro_rules! apply {
            ($field:ident) => {
                if let Some(value) = self.$field {
                    config.$field = value;
                }
            };
        }

        apply!(variable_activity_decay);
        apply!(clause_activity_decay);
        apply!(initial_polarity);
        apply!(use_phase_saving);
        apply!(preferred_variable_order);
        apply!(random_branches_ratio);
        apply!(random_polarity_ratio);
        apply!(restart_period);
        apply!(minimization_algorithm);
        apply!(binary_minimization_algorithm);
        apply!(treat_binary_clauses_separately);
        apply!(use_pb_resolution);
        apply!(use_lbd);
        apply!(use_glucose_bump_again_strategy);
        apply!(glucose_decay_increment);
        apply!(glucose_decay_increment_period);
        apply!(glucose_max_decay);
        apply!(minimize_reduction_during_pb_resolution);
        apply!(clause_cleanup_ratio);
        apply!(clause_cleanup_increment);
        apply!(reduce_locals_interval);
        apply!(reduce_mids_interval);
        apply!(max_number_of_conflicts);
        apply!(max_time_in_seconds);
        apply!(max_memory_in_mb);
        apply!(unsat_proof);
        apply!(count_assumption_levels_in_lbd);
        apply!(log_search_progress);
        apply!(random_seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reapplying_update_is_idempotent() {
        let mut config = SolverConfig::default();
        let update = SolverConfigUpdate {
            variable_activity_decay: Some(0.8),
            restart_period: Some(64),
            random_seed: Some(42),
            ..SolverConfigUpdate::default()
        };

        update.apply_to(&mut config);
        let once = config;
        update.apply_to(&mut config);

        assert_eq!(once.variable_activity_decay, config.variable_activity_decay);
        assert_eq!(once.restart_period, config.restart_period);
        assert_eq!(once.random_seed, config.random_seed);
    }
}

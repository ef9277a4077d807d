//! Branching decisions.
pub mod vsids;

use partial_ref::{partial, PartialRef};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::config::{InitialPolarity, VariableOrder};
use crate::context::{
    AssignmentP, Context, DecisionP, ImplGraphP, SolverConfigP, TrailP, VsidsP,
};
use crate::prop::{enqueue_assignment, Reason};
use pbsat_formula::{Lit, Var};

/// Random choices and per-variable occurrence counts used by the decision heuristic.
///
/// The RNG is kept separate from [`vsids::Vsids`] so it can be reseeded independently of the
/// activity state whenever `random_seed` changes.
pub struct Decision {
    rng: Pcg32,
    /// Running sum of signed occurrences for each variable: incremented for every positive
    /// occurrence added to the formula, decremented for every negative one.
    sign_occurrences: Vec<i64>,
}

impl Default for Decision {
    fn default() -> Decision {
        Decision {
            rng: Pcg32::seed_from_u64(0),
            sign_occurrences: vec![],
        }
    }
}

impl Decision {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.sign_occurrences.resize(count, 0);
    }

    /// Reseed the random number generator.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = Pcg32::seed_from_u64(seed);
    }

    /// Record one occurrence of `lit` in a clause or constraint added to the formula.
    pub fn record_occurrence(&mut self, lit: Lit) {
        self.sign_occurrences[lit.index()] += if lit.is_positive() { 1 } else { -1 };
    }

    /// Whether `var` occurs positively at least as often as negatively.
    pub fn weighted_sign(&self, var: Var) -> bool {
        self.sign_occurrences[var.index()] >= 0
    }
}

/// Make a variable available for decisions again.
///
/// Called when a variable becomes unassigned, either during backtracking or when it is first
/// added to the solver.
pub fn make_available(mut ctx: partial!(Context, mut VsidsP), var: Var) {
    ctx.part_mut(VsidsP).make_available(var);
}

/// Pick the next branching variable, honoring `preferred_variable_order` and
/// `random_branches_ratio`.
fn pick_variable(
    mut ctx: partial!(Context, SolverConfigP, mut VsidsP, mut DecisionP),
) -> Option<Var> {
    let config = *ctx.part(SolverConfigP);

    let random_branch = config.random_branches_ratio > 0.0
        && ctx.part_mut(DecisionP).rng.gen_bool(config.random_branches_ratio);

    let order = if random_branch {
        VariableOrder::Random
    } else {
        config.preferred_variable_order
    };

    match order {
        VariableOrder::Vsids => ctx.part_mut(VsidsP).next(),
        VariableOrder::InOrder => {
            let var = ctx.part(VsidsP).first_available();
            if let Some(var) = var {
                ctx.part_mut(VsidsP).remove_available(var);
            }
            var
        }
        VariableOrder::Random => {
            let (vsids, mut ctx) = ctx.split_part_mut(VsidsP);
            let var = vsids.random_available(&mut ctx.part_mut(DecisionP).rng);
            if let Some(var) = var {
                vsids.remove_available(var);
            }
            var
        }
    }
}

/// Pick the polarity for a newly decided variable, honoring `random_polarity_ratio`,
/// `use_phase_saving` and `initial_polarity`.
fn pick_polarity(
    mut ctx: partial!(Context, AssignmentP, SolverConfigP, mut DecisionP),
    var: Var,
) -> bool {
    let config = *ctx.part(SolverConfigP);

    let random_polarity = config.random_polarity_ratio > 0.0
        && ctx.part_mut(DecisionP).rng.gen_bool(config.random_polarity_ratio);

    if random_polarity {
        return ctx.part_mut(DecisionP).rng.gen_bool(0.5);
    }

    if config.use_phase_saving {
        return ctx.part(AssignmentP).last_var_value(var);
    }

    match config.initial_polarity {
        InitialPolarity::True => true,
        InitialPolarity::False => false,
        InitialPolarity::Random => ctx.part_mut(DecisionP).rng.gen_bool(0.5),
        InitialPolarity::WeightedSign => ctx.part(DecisionP).weighted_sign(var),
        InitialPolarity::ReverseWeightedSign => !ctx.part(DecisionP).weighted_sign(var),
    }
}

/// Make a decision and enqueue it.
///
/// Returns `false` if no decision was made because all variables are assigned.
pub fn make_decision(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut TrailP,
        mut VsidsP,
        mut DecisionP,
        SolverConfigP,
    ),
) -> bool {
    let var = match pick_variable(ctx.borrow()) {
        Some(var) => var,
        None => return false,
    };

    let positive = pick_polarity(ctx.borrow(), var);

    let decision = Lit::from_var(var, positive);

    ctx.part_mut(TrailP).new_decision_level();

    enqueue_assignment(ctx.borrow(), decision, Reason::Unit);

    true
}

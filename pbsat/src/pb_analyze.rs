//! Analyzes a conflicting pseudo-Boolean constraint and derives a learned constraint.
//!
//! Generalizes clause conflict analysis (`analyze_conflict`) to pseudo-Boolean constraints: the
//! conflicting constraint is resolved against the reason of each current-level literal, in
//! reverse trail order, until only one current-level term remains. Resolution cancels a pivot
//! variable between two `<=` constraints by scaling both sides so the pivot's coefficients match
//! and then combining terms; unlike clause resolution this requires the coefficients to actually
//! line up, so each clause or binary reason is first lifted to an equivalent unit-coefficient
//! constraint.
use partial_ref::{partial, PartialRef};

use pbsat_formula::Lit;

use crate::context::{
    AssignmentP, ClauseAllocP, Context, ImplGraphP, PbConstraintsP, SolverConfigP, TrailP,
};
use crate::pb::{canonicalize, PbConstraint, PbRef, PbTerm};
use crate::prop::Reason;

/// Outcome of analyzing a conflicting pseudo-Boolean constraint.
pub enum PbAnalysis {
    /// A new constraint, asserting once backtracked to `backtrack_to`.
    Learned {
        constraint: PbConstraint,
        backtrack_to: usize,
    },
    /// The conflict persists with no decisions to undo: the formula is unsatisfiable.
    Unsat,
}

/// Express the constraint that forced `forced_lit` true as a unit-coefficient or original
/// pseudo-Boolean `<=` constraint, for use as a generalized resolution step.
fn reason_as_pb(
    ctx: &partial!(Context, ClauseAllocP, ImplGraphP, PbConstraintsP),
    reason: &Reason,
    forced_lit: Lit,
) -> (Vec<PbTerm>, i64) {
    match reason {
        Reason::Unit => unreachable!("decision reached before current-level count dropped to zero"),
        Reason::Binary(lits) => lift_clause(forced_lit, lits),
        Reason::Long(cref) => {
            let other_lits = &ctx.part(ClauseAllocP).clause(*cref).lits()[1..];
            lift_clause(forced_lit, other_lits)
        }
        Reason::Pb(cref, _) => {
            let constraint = ctx.part(PbConstraintsP).constraint(*cref);
            (constraint.terms().to_vec(), constraint.rhs() as i64)
        }
        // Same underlying constraint as the referenced variable: its exact terms apply unchanged.
        Reason::SameAs(var) => {
            let inner_reason = *ctx.part(ImplGraphP).reason(*var);
            reason_as_pb(ctx, &inner_reason, forced_lit)
        }
    }
}

/// A clause `forced_lit \/ !r_1 \/ ... \/ !r_k` (the other reason literals all false, forcing
/// `forced_lit` true) is equivalent to the constraint `!forced_lit + r_1 + ... + r_k <= k`.
fn lift_clause(forced_lit: Lit, other_lits: &[Lit]) -> (Vec<PbTerm>, i64) {
    let rhs = other_lits.len() as i64;
    let mut terms = vec![PbTerm {
        coeff: 1,
        lit: !forced_lit,
    }];
    terms.extend(other_lits.iter().map(|&lit| PbTerm { coeff: 1, lit }));
    (terms, rhs)
}

/// Analyze the pseudo-Boolean constraint `cref`, currently violated by the assignment, into a
/// learned constraint and the level it should be asserted at after backtracking.
pub fn analyze_pb_conflict(
    ctx: partial!(
        Context,
        AssignmentP,
        ClauseAllocP,
        ImplGraphP,
        PbConstraintsP,
        SolverConfigP,
        TrailP,
    ),
    cref: PbRef,
) -> PbAnalysis {
    let current_level = ctx.part(TrailP).current_level();
    if current_level == 0 {
        return PbAnalysis::Unsat;
    }

    let reduce = ctx
        .part(SolverConfigP)
        .minimize_reduction_during_pb_resolution;

    let seed = ctx.part(PbConstraintsP).constraint(cref).clone();
    let mut terms: Vec<PbTerm> = seed.terms().to_vec();
    let mut rhs: i64 = seed.rhs() as i64;

    let mut count_at_current_level = terms
        .iter()
        .filter(|t| {
            ctx.part(AssignmentP).lit_is_true(t.lit)
                && ctx.part(ImplGraphP).level(t.lit.var()) == current_level
        })
        .count();

    for &trail_lit in ctx.part(TrailP).trail().iter().rev() {
        if count_at_current_level == 0 {
            break;
        }
        if ctx.part(ImplGraphP).level(trail_lit.var()) != current_level {
            continue;
        }
        let idx = match terms.iter().position(|t| t.lit == trail_lit) {
            Some(idx) => idx,
            None => continue,
        };

        count_at_current_level -= 1;
        if count_at_current_level == 0 {
            break;
        }

        let reason = *ctx.part(ImplGraphP).reason(trail_lit.var());
        let (reason_terms, reason_rhs) = reason_as_pb(&ctx, &reason, trail_lit);

        let pivot_in_working = terms[idx].coeff as i64;
        let pivot_in_reason = reason_terms
            .iter()
            .find(|t| t.lit == !trail_lit)
            .map(|t| t.coeff as i64)
            .unwrap_or(1);

        let scaled_working = terms
            .iter()
            .map(|t| (t.coeff as i64 * pivot_in_reason, t.lit));
        let scaled_reason = reason_terms
            .iter()
            .map(|t| (t.coeff as i64 * pivot_in_working, t.lit));

        let combined_rhs = rhs * pivot_in_reason + reason_rhs * pivot_in_working;
        let (mut new_terms, new_rhs) = canonicalize(scaled_working.chain(scaled_reason), combined_rhs);

        if reduce && new_rhs >= 0 {
            for t in &mut new_terms {
                if t.coeff as i64 > new_rhs {
                    t.coeff = new_rhs as u64;
                }
            }
        }

        terms = new_terms;
        rhs = new_rhs;
    }

    if rhs < 0 {
        return PbAnalysis::Unsat;
    }

    let mut backtrack_to = 0;
    for t in &terms {
        let level = ctx.part(ImplGraphP).level(t.lit.var());
        if level != current_level && level > backtrack_to {
            backtrack_to = level;
        }
    }

    PbAnalysis::Learned {
        constraint: PbConstraint::new(terms, rhs as u64),
        backtrack_to,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::{set_var_count, Context, TrailP};
    use crate::pb::add_pb_constraint;
    use crate::prop::{enqueue_assignment, propagate, PropagationConflict};

    #[test]
    fn at_most_one_conflict_learns_binary_constraint() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);

        let a = Lit::from_index(0, true);
        let b = Lit::from_index(1, true);

        add_pb_constraint(ctx.borrow(), &[(1, a), (1, b)], 1);

        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), a, Reason::Unit);
        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), b, Reason::Unit);

        let err = propagate(ctx.borrow()).unwrap_err();
        let cref = match err {
            PropagationConflict::Pb(cref) => cref,
            _ => panic!("expected PB conflict"),
        };

        match analyze_pb_conflict(ctx.borrow(), cref) {
            PbAnalysis::Learned {
                constraint,
                backtrack_to,
            } => {
                assert!(constraint.is_clausal());
                assert_eq!(backtrack_to, 1);
            }
            PbAnalysis::Unsat => panic!("expected a learned constraint"),
        }
    }
}

//! Pseudo-Boolean constraint propagation.
//!
//! Grounded on the slack-propagation idiom used for linear constraints in constraint solvers
//! (bound computed from accumulated true-term contributions, reason built from the remaining
//! terms' current truth values), adapted to the 0/1-literal, canonical-coefficient setting used
//! here. Unlike a watched-literal clause, a constraint's slack is recomputed from scratch whenever
//! one of its terms becomes true rather than updated incrementally; this trades a constant factor
//! for much simpler backtracking bookkeeping (see `DESIGN.md`).
use rustc_hash::FxHashMap as HashMap;

use partial_ref::{partial, PartialRef};

use pbsat_formula::{Lit, Var};

use crate::context::{
    AssignmentP, AssumptionsP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, DecisionP,
    ImplGraphP, PbConstraintsP, SolverStateP, TmpDataP, TrailP, VsidsP, WatchlistsP,
};
use crate::load::load_clause;
use crate::prop::{enqueue_assignment, Assignment, PropagationConflict, Reason};
use crate::state::SatState;

/// One term of a canonical PB constraint: `coeff * lit`, `coeff > 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PbTerm {
    pub coeff: u64,
    pub lit: Lit,
}

/// A canonical pseudo-Boolean constraint `sum coeff_i * lit_i <= rhs`.
///
/// Terms are sorted by non-increasing coefficient, every coefficient is positive and no two terms
/// share a variable.
#[derive(Clone, Debug, Default)]
pub struct PbConstraint {
    terms: Vec<PbTerm>,
    rhs: u64,
}

impl PbConstraint {
    pub fn new(mut terms: Vec<PbTerm>, rhs: u64) -> PbConstraint {
        terms.sort_unstable_by(|a, b| b.coeff.cmp(&a.coeff));
        PbConstraint { terms, rhs }
    }

    pub fn terms(&self) -> &[PbTerm] {
        &self.terms
    }

    pub fn rhs(&self) -> u64 {
        self.rhs
    }

    pub fn max_value(&self) -> u64 {
        self.terms.iter().map(|term| term.coeff).sum()
    }

    /// `rhs - sum of coefficients of currently true terms`.
    pub fn slack(&self, assignment: &Assignment) -> i64 {
        let true_sum: u64 = self
            .terms
            .iter()
            .filter(|term| assignment.lit_is_true(term.lit))
            .map(|term| term.coeff)
            .sum();
        self.rhs as i64 - true_sum as i64
    }

    /// Saturate every coefficient larger than `rhs` down to `rhs`.
    pub fn saturate(&mut self) {
        for term in &mut self.terms {
            if term.coeff > self.rhs {
                term.coeff = self.rhs;
            }
        }
    }

    /// Whether this constraint is, after canonicalization, equivalent to a clause (all
    /// coefficients 1 and `rhs = terms.len() - 1`).
    pub fn is_clausal(&self) -> bool {
        self.rhs as usize + 1 == self.terms.len() && self.terms.iter().all(|term| term.coeff == 1)
    }
}

/// Opaque reference to a constraint stored in [`PbConstraints`].
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct PbRef(u32);

/// Result of normalizing and adding a user-supplied linear constraint.
#[derive(Debug)]
pub enum AddPbConstraint {
    Added(PbRef),
    /// The constraint was a disguised clause and was handed to the clause path instead of being
    /// stored as a `PbConstraint`.
    AddedAsClause,
    /// The constraint is always true given the fixed variables known at add time.
    TriviallySatisfied,
    /// The constraint can never be satisfied.
    Unsat,
}

/// Storage and watch lists for PB constraints.
///
/// Reasons for PB-forced literals are materialized on the trail (`Trail::cache_reason`), not here:
/// `Reason::Pb`'s index addresses the trail's reason cache, which reclaims entries on backtrack.
#[derive(Default)]
pub struct PbConstraints {
    constraints: Vec<PbConstraint>,
    /// For each literal, the constraints containing it as a term, re-checked whenever the literal
    /// becomes true.
    watches: Vec<Vec<PbRef>>,
}

impl PbConstraints {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.watches.resize(count * 2, Vec::new());
    }

    pub fn constraint(&self, cref: PbRef) -> &PbConstraint {
        &self.constraints[cref.0 as usize]
    }

    pub fn count(&self) -> usize {
        self.constraints.len()
    }

    fn store(&mut self, constraint: PbConstraint) -> PbRef {
        let cref = PbRef(self.constraints.len() as u32);
        for &term in constraint.terms() {
            self.watches[term.lit.index()].push(cref);
        }
        self.constraints.push(constraint);
        cref
    }
}

/// Merge possibly-negative, possibly-duplicate terms into canonical (positive coefficient,
/// one term per variable) form.
///
/// Negative coefficients are rewritten in terms of the negated literal (`a*l` becomes
/// `|a|*!l - |a|`, with the constant folded into `rhs`), duplicate literals are merged and
/// complementary literals (`l` and `!l` both present) are cancelled. The returned `rhs` may be
/// negative, meaning the terms as given can never be satisfied.
pub(crate) fn canonicalize(terms: impl Iterator<Item = (i64, Lit)>, mut rhs: i64) -> (Vec<PbTerm>, i64) {
    let mut by_var: HashMap<Var, i64> = HashMap::default();

    for (coeff, lit) in terms {
        if coeff == 0 {
            continue;
        }
        let (coeff, lit) = if coeff < 0 {
            rhs += -coeff;
            (-coeff, !lit)
        } else {
            (coeff, lit)
        };
        let signed = if lit.is_positive() { coeff } else { -coeff };
        *by_var.entry(lit.var()).or_insert(0) += signed;
    }

    let mut pb_terms = vec![];
    for (var, signed) in by_var {
        match signed {
            0 => (),
            signed if signed > 0 => pb_terms.push(PbTerm {
                coeff: signed as u64,
                lit: Lit::from_var(var, true),
            }),
            signed => pb_terms.push(PbTerm {
                coeff: (-signed) as u64,
                lit: Lit::from_var(var, false),
            }),
        }
    }

    (pb_terms, rhs)
}

/// Normalize a user-supplied `sum coeff_i * lit_i <= rhs` constraint into canonical form and add
/// it to the solver.
pub fn add_pb_constraint(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut AssumptionsP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut DecisionP,
        mut ImplGraphP,
        mut PbConstraintsP,
        mut SolverStateP,
        mut TmpDataP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    terms: &[(i64, Lit)],
    rhs: i64,
) -> AddPbConstraint {
    let (pb_terms, rhs) = canonicalize(terms.iter().copied(), rhs);

    if rhs < 0 {
        return AddPbConstraint::Unsat;
    }
    let rhs = rhs as u64;

    let max_value: u64 = pb_terms.iter().map(|term| term.coeff).sum();

    if rhs >= max_value {
        return AddPbConstraint::TriviallySatisfied;
    }

    // The only assignment this constraint can rule out is "every literal true" when even
    // excluding the smallest-coefficient term still exceeds `rhs`; it's then a disguised clause
    // and gets clause-DB bookkeeping (activity, LBD, cleanup) instead of living on as an inert
    // PB constraint.
    let min_coeff = pb_terms.iter().map(|term| term.coeff).min().unwrap_or(0);

    if max_value - min_coeff <= rhs {
        let clause: Vec<Lit> = pb_terms.iter().map(|term| !term.lit).collect();
        load_clause(ctx.borrow(), &clause);
        return if ctx.part(SolverStateP).sat_state == SatState::Unsat {
            AddPbConstraint::Unsat
        } else {
            AddPbConstraint::AddedAsClause
        };
    }

    let mut constraint = PbConstraint::new(pb_terms, rhs);
    constraint.saturate();

    for term in constraint.terms() {
        ctx.part_mut(DecisionP).record_occurrence(term.lit);
    }

    let cref = ctx.part_mut(PbConstraintsP).store(constraint);

    match check_constraint(ctx.borrow(), cref) {
        Ok(()) => AddPbConstraint::Added(cref),
        Err(_) => AddPbConstraint::Unsat,
    }
}

/// Store an already-canonical, already-saturated constraint derived by conflict analysis.
///
/// Unlike [`add_pb_constraint`] this performs no canonicalization or triviality checks: the
/// caller is expected to have produced a well-formed, genuinely asserting constraint.
pub(crate) fn store_learned_constraint(
    mut ctx: partial!(Context, mut PbConstraintsP),
    constraint: PbConstraint,
) -> PbRef {
    ctx.part_mut(PbConstraintsP).store(constraint)
}

/// Re-derive a stored constraint's slack and perform any propagation it now allows.
///
/// Exposed so conflict analysis can ask a newly learned and stored constraint to immediately
/// assert its unit literal after backtracking.
pub(crate) fn recheck_constraint(
    ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut PbConstraintsP,
        mut TrailP,
    ),
    cref: PbRef,
) -> Result<(), PropagationConflict> {
    check_constraint(ctx, cref)
}

/// Re-derive a constraint's slack from scratch and perform any propagation it now allows.
fn check_constraint(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut PbConstraintsP,
        mut TrailP,
    ),
    cref: PbRef,
) -> Result<(), PropagationConflict> {
    let constraint = ctx.part(PbConstraintsP).constraint(cref).clone();
    let (assignment, mut ctx) = ctx.split_part(AssignmentP);

    let slack = constraint.slack(assignment);
    if slack < 0 {
        return Err(PropagationConflict::Pb(cref));
    }

    // Terms are in non-increasing coefficient order, so literals forced by terms sharing the same
    // coefficient as the one before them are forced by an identical reason (the filter below
    // depends only on `term.coeff`, and a term forced false here never turns a later `lit_is_true`
    // check true). Rather than re-deriving and re-caching that reason for every such literal, later
    // members of the group point back to the first one via `Reason::SameAs`.
    let mut same_coeff_group: Option<(u64, Var)> = None;

    for term in constraint.terms() {
        if term.coeff as i64 <= slack {
            break;
        }
        if !assignment.lit_is_unk(term.lit) {
            continue;
        }

        let forced_lit = !term.lit;

        let reason = match same_coeff_group {
            Some((coeff, representative)) if coeff == term.coeff => Reason::SameAs(representative),
            _ => {
                // Minimal reason: the currently true terms, dropping the smallest-coefficient ones
                // first as long as the remaining sum still exceeds `rhs - term.coeff`.
                let threshold = constraint.rhs() as i64 - term.coeff as i64;
                let mut true_terms: Vec<PbTerm> = constraint
                    .terms()
                    .iter()
                    .filter(|t| assignment.lit_is_true(t.lit))
                    .copied()
                    .collect();
                true_terms.sort_unstable_by_key(|t| t.coeff);

                let mut remaining_sum: i64 = true_terms.iter().map(|t| t.coeff as i64).sum();
                let mut reason_lits = vec![];
                for t in true_terms {
                    if remaining_sum - t.coeff as i64 > threshold {
                        remaining_sum -= t.coeff as i64;
                    } else {
                        reason_lits.push(t.lit);
                    }
                }

                let id = ctx.part_mut(TrailP).cache_reason(reason_lits);
                same_coeff_group = Some((term.coeff, forced_lit.var()));
                Reason::Pb(cref, id)
            }
        };

        enqueue_assignment(ctx.borrow(), forced_lit, reason);
    }

    Ok(())
}

/// Propagate all PB constraints that contain `true_lit` as a term.
pub fn propagate_pb(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut PbConstraintsP,
        mut TrailP,
    ),
    true_lit: Lit,
) -> Result<(), PropagationConflict> {
    let watchers = ctx.part(PbConstraintsP).watches[true_lit.index()].clone();
    for cref in watchers {
        check_constraint(ctx.borrow(), cref)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::{set_var_count, Context};
    use crate::prop::propagate;

    #[test]
    fn unit_propagation_forces_excess_literals() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        let a = Lit::from_index(0, true);
        let b = Lit::from_index(1, true);
        let c = Lit::from_index(2, true);

        // a + b + c <= 1: at most one of them may be true.
        let result = add_pb_constraint(ctx.borrow(), &[(1, a), (1, b), (1, c)], 1);
        assert!(matches!(result, AddPbConstraint::Added(_)));

        enqueue_assignment(ctx.borrow(), a, Reason::Unit);

        assert!(propagate(ctx.borrow()).is_ok());

        assert!(ctx.part(AssignmentP).lit_is_false(b));
        assert!(ctx.part(AssignmentP).lit_is_false(c));
    }

    #[test]
    fn constraint_degenerating_to_a_clause_is_handed_to_the_clause_path() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        let a = Lit::from_index(0, true);
        let b = Lit::from_index(1, true);
        let c = Lit::from_index(2, true);

        // x1 + x2 + x3 <= 2: excluding even the smallest-coefficient term still exceeds rhs, so
        // this is really the clause (-x1 v -x2 v -x3).
        let result = add_pb_constraint(ctx.borrow(), &[(1, a), (1, b), (1, c)], 2);
        assert!(matches!(result, AddPbConstraint::AddedAsClause));
        assert_eq!(ctx.part(PbConstraintsP).count(), 0);

        enqueue_assignment(ctx.borrow(), a, Reason::Unit);
        enqueue_assignment(ctx.borrow(), b, Reason::Unit);

        assert!(propagate(ctx.borrow()).is_ok());

        assert!(ctx.part(AssignmentP).lit_is_false(c));
    }

    #[test]
    fn trivially_unsat_constraint_is_rejected() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 1);

        let a = Lit::from_index(0, true);

        let result = add_pb_constraint(ctx.borrow(), &[(5, a)], -1);
        assert!(matches!(result, AddPbConstraint::Unsat));
    }
}

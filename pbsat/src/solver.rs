//! Boolean satisfiability and pseudo-Boolean solver.
use std::io;

use partial_ref::{IntoPartialRef, IntoPartialRefMut, PartialRef};

use log::info;

use pbsat_dimacs::DimacsParser;
use pbsat_formula::{CnfFormula, Lit, Var};

use crate::context::{ensure_var_count, AssignmentP, AssumptionsP, ClauseAllocP, Context};
use crate::context::{config_changed, ClauseActivityP, DecisionP, SolverConfigP, VsidsP};
use crate::context::{ModelP, SolverStateP};
use crate::error::SolverError;
use crate::load::load_clause;
use crate::model::Model;
use crate::pb::{add_pb_constraint, AddPbConstraint};
use crate::schedule::schedule_step;
use crate::state::SatState;
use crate::{SolverConfig, SolverConfigUpdate};

/// Outcome of a call to [`Solver::solve`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SolveResult {
    /// The current formula and assumptions are satisfiable.
    Sat,
    /// The current formula is unsatisfiable, independent of any assumptions.
    Unsat,
    /// The current formula is satisfiable but not together with the current assumptions.
    UnsatUnderAssumptions,
    /// Solving stopped early because of a configured limit, with no result yet.
    LimitReached,
}

/// A CDCL based SAT and pseudo-Boolean constraint solver.
#[derive(Default)]
pub struct Solver {
    ctx: Box<Context>,
}

impl Solver {
    /// Create a new solver.
    pub fn new() -> Solver {
        Solver::default()
    }

    /// Change solver parameters.
    ///
    /// Unset fields of `update` leave the corresponding parameter unchanged.
    pub fn set_config(&mut self, update: &SolverConfigUpdate) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        update.apply_to(ctx.part_mut(SolverConfigP));
        config_changed(ctx.borrow(), update);
    }

    /// Current solver parameters.
    pub fn config(&self) -> SolverConfig {
        let mut ctx = self.ctx.into_partial_ref();
        *ctx.part(SolverConfigP)
    }

    /// Increase the number of variables known to the solver, if necessary.
    ///
    /// Adding a clause, constraint or assumption that mentions a variable past the current count
    /// does this automatically, so calling this explicitly is only needed to pre-size the solver.
    pub fn ensure_var_count(&mut self, count: usize) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ensure_var_count(ctx.borrow(), count);
    }

    /// Add a formula in memory.
    pub fn add_formula(&mut self, formula: &CnfFormula) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ensure_var_count(ctx.borrow(), formula.var_count());
        for clause in formula.iter() {
            load_clause(ctx.borrow(), clause);
        }
    }

    /// Add a single clause.
    ///
    /// Returns `false` if this makes the formula unsatisfiable (this can also happen for reasons
    /// unrelated to the added clause, if the solver was already unsatisfiable).
    pub fn add_clause(&mut self, lits: &[Lit]) -> bool {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ensure_var_count(ctx.borrow(), var_count_for(lits));
        load_clause(ctx.borrow(), lits);
        ctx.part(SolverStateP).sat_state != SatState::Unsat
    }

    /// Reads and adds a formula in DIMACS CNF format.
    ///
    /// Using this avoids creating a temporary [`CnfFormula`].
    pub fn add_dimacs_cnf(&mut self, input: impl io::Read) -> Result<(), SolverError> {
        use io::BufRead;

        let mut buffer = io::BufReader::new(input);
        let mut parser = DimacsParser::new();

        loop {
            let data = buffer.fill_buf()?;
            if data.is_empty() {
                break;
            }
            parser.parse_chunk(data)?;
            let len = data.len();
            buffer.consume(len);

            self.add_formula(&parser.take_formula());
        }
        parser.eof()?;
        self.add_formula(&parser.take_formula());
        parser.check_header()?;

        info!(
            "Parsed formula with {} variables and {} clauses",
            parser.var_count(),
            parser.clause_count()
        );

        Ok(())
    }

    /// Add a pseudo-Boolean constraint `sum coeff_i * lit_i <= rhs`.
    ///
    /// Returns `false` if this makes the formula unsatisfiable.
    pub fn add_pb_constraint(&mut self, terms: &[(i64, Lit)], rhs: i64) -> bool {
        let lits: Vec<Lit> = terms.iter().map(|&(_, lit)| lit).collect();
        let mut ctx = self.ctx.into_partial_ref_mut();
        ensure_var_count(ctx.borrow(), var_count_for(&lits));

        match add_pb_constraint(ctx.borrow(), terms, rhs) {
            AddPbConstraint::Added(_)
            | AddPbConstraint::AddedAsClause
            | AddPbConstraint::TriviallySatisfied => true,
            AddPbConstraint::Unsat => {
                ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
                false
            }
        }
    }

    /// Add a double bounded linear constraint `lb <= sum coeff_i * lit_i <= ub`.
    ///
    /// Either bound can be disabled, resulting in at most one of the two equivalent `<=`
    /// constraints being added. Returns `false` if this makes the formula unsatisfiable.
    pub fn add_linear_constraint(
        &mut self,
        use_lb: bool,
        lb: i64,
        use_ub: bool,
        ub: i64,
        terms: &[(i64, Lit)],
    ) -> bool {
        let mut ok = true;
        if use_ub {
            ok &= self.add_pb_constraint(terms, ub);
        }
        if use_lb {
            let negated: Vec<(i64, Lit)> = terms.iter().map(|&(coeff, lit)| (-coeff, lit)).collect();
            ok &= self.add_pb_constraint(&negated, -lb);
        }
        ok
    }

    /// Set the assumptions used by the next call to [`solve`](Solver::solve).
    pub fn set_assumptions(&mut self, assumptions: &[Lit]) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ensure_var_count(ctx.borrow(), var_count_for(assumptions));
        crate::assumptions::set_assumptions(ctx.borrow(), assumptions);
    }

    /// Check the satisfiability of the current formula, subject to the current assumptions and
    /// configured limits.
    pub fn solve(&mut self) -> SolveResult {
        let mut ctx = self.ctx.into_partial_ref_mut();
        while schedule_step(ctx.borrow()) {}
        match ctx.part(SolverStateP).sat_state {
            SatState::Unknown => SolveResult::LimitReached,
            SatState::Sat => SolveResult::Sat,
            SatState::Unsat => SolveResult::Unsat,
            SatState::UnsatUnderAssumptions => SolveResult::UnsatUnderAssumptions,
        }
    }

    /// The satisfying assignment found by the last call to [`solve`](Solver::solve).
    ///
    /// Only available after a [`SolveResult::Sat`] result.
    pub fn model(&self) -> Option<Vec<Lit>> {
        let mut ctx = self.ctx.into_partial_ref();
        if ctx.part(SolverStateP).sat_state != SatState::Sat {
            return None;
        }
        Some(model_lits(ctx.part(ModelP)))
    }

    /// Whether `lit` is true in the model found by the last call to [`solve`](Solver::solve).
    ///
    /// Only valid after a [`SolveResult::Sat`] result.
    pub fn model_lit_is_true(&self, lit: Lit) -> bool {
        let mut ctx = self.ctx.into_partial_ref();
        ctx.part(ModelP).lit_is_true(lit)
    }

    /// A subset of the current assumptions that is sufficient to make the formula unsatisfiable.
    ///
    /// Only available after a [`SolveResult::UnsatUnderAssumptions`] result. Returned in the
    /// reverse of the order the assumptions were enqueued in.
    pub fn failed_core(&self) -> Option<Vec<Lit>> {
        let mut ctx = self.ctx.into_partial_ref();
        if ctx.part(SolverStateP).sat_state != SatState::UnsatUnderAssumptions {
            return None;
        }
        Some(ctx.part(AssumptionsP).failed_core().to_owned())
    }

    /// A best-effort unsat core for a plain (assumption independent) [`SolveResult::Unsat`]
    /// result.
    ///
    /// This lists the literals of the irredundant clauses resolved on while deriving the level-0
    /// conflict. Unlike [`failed_core`](Solver::failed_core) this is not minimized and does not
    /// track the full resolution chain behind any learned clauses involved.
    pub fn unsat_core(&self) -> Option<Vec<Lit>> {
        let mut ctx = self.ctx.into_partial_ref();
        if ctx.part(SolverStateP).sat_state != SatState::Unsat {
            return None;
        }
        let alloc = ctx.part(ClauseAllocP);
        Some(
            ctx.part(SolverStateP)
                .unsat_core()
                .iter()
                .flat_map(|&cref| alloc.clause(cref).lits().to_vec())
                .collect(),
        )
    }
}

fn model_lits(model: &Model) -> Vec<Lit> {
    model
        .assignment()
        .iter()
        .enumerate()
        .flat_map(|(index, assignment)| {
            assignment.map(|polarity| Lit::from_var(Var::from_index(index), !polarity))
        })
        .collect()
}

/// Smallest variable count that covers every variable mentioned in `lits`.
fn var_count_for(lits: &[Lit]) -> usize {
    lits.iter().map(|lit| lit.var().index() + 1).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use pbsat_dimacs::write_dimacs;
    use pbsat_formula::test::{sat_formula, sgen_unsat_formula};

    #[test]
    fn at_most_one_pb_constraint() {
        let mut solver = Solver::new();
        solver.ensure_var_count(3);

        let a = Lit::from_dimacs(1);
        let b = Lit::from_dimacs(2);
        let c = Lit::from_dimacs(3);

        assert!(solver.add_pb_constraint(&[(1, a), (1, b), (1, c)], 1));
        assert!(solver.add_clause(&[a]));
        assert!(solver.add_clause(&[b]));

        assert_eq!(solver.solve(), SolveResult::Unsat);
    }

    #[test]
    fn assumptions_produce_unsat_under_assumptions() {
        let mut solver = Solver::new();
        solver.ensure_var_count(2);

        let a = Lit::from_dimacs(1);
        let b = Lit::from_dimacs(2);

        solver.add_clause(&[a, b]);
        solver.add_clause(&[!a, b]);
        solver.add_clause(&[a, !b]);

        solver.set_assumptions(&[!a, !b]);

        assert_eq!(solver.solve(), SolveResult::UnsatUnderAssumptions);
        assert!(!solver.failed_core().unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn sgen_unsat(formula in sgen_unsat_formula(1..7usize)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve(), SolveResult::Unsat);
        }

        #[test]
        fn sat(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve(), SolveResult::Sat);

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn sat_via_dimacs(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            let mut dimacs = vec![];

            write_dimacs(&mut dimacs, &formula).unwrap();

            solver.add_dimacs_cnf(&mut &dimacs[..]).unwrap();

            prop_assert_eq!(solver.solve(), SolveResult::Sat);

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn sgen_unsat_incremetal_clauses(formula in sgen_unsat_formula(1..7usize)) {
            let mut solver = Solver::new();

            let mut last_state = SolveResult::Sat;

            for clause in formula.iter() {
                let single_clause = CnfFormula::from(Some(clause));
                solver.add_formula(&single_clause);

                let state = solver.solve();
                if state != last_state {
                    prop_assert_eq!(state, SolveResult::Unsat);
                    prop_assert_eq!(last_state, SolveResult::Sat);
                    last_state = state;
                }
            }

            prop_assert_eq!(last_state, SolveResult::Unsat);
        }
    }
}

//! Learns a new clause by analyzing a conflict.
use std::collections::HashSet;
use std::mem::swap;

use partial_ref::{partial, split_borrow, PartialRef};

use crate::binary::BinaryClauses;
use crate::clause::ClauseRef;
use crate::config::{BinaryMinimizationAlgorithm, MinimizationAlgorithm};
use crate::context::{
    AnalyzeConflictP, BinaryClausesP, ClauseAllocP, Context, ImplGraphP, PbConstraintsP,
    SolverConfigP, TrailP, VsidsP,
};
use crate::prop::{Conflict, Reason};
use pbsat_formula::{Lit, Var};

use crate::vec_mut_scan::VecMutScan;

/// Temporaries for conflict analysis
#[derive(Default)]
pub struct AnalyzeConflict {
    /// This is the learned clause after analysis finishes.
    clause: Vec<Lit>,
    /// Number of literals in the current clause at the current level.
    current_level_count: usize,
    /// Variables in the current clause.
    var_flags: Vec<bool>,
    /// Entries to clean in `var_flags`.
    to_clean: Vec<Var>,
    /// Clauses to bump.
    ///
    /// For a level-0 conflict this also serves as a best-effort, non-transitive unsat core: the
    /// irredundant clauses among these are the ones directly involved in deriving the empty
    /// clause.
    involved: Vec<ClauseRef>,
    /// Stack for recursive minimization.
    stack: Vec<Lit>,
}

impl AnalyzeConflict {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.var_flags.resize(count, false);
    }

    /// The learned clause.
    pub fn clause(&self) -> &[Lit] {
        &self.clause
    }

    /// Long clauses involved in the conflict.
    pub fn involved(&self) -> &[ClauseRef] {
        &self.involved
    }
}

/// Learns a new clause by analyzing a conflict.
///
/// Returns the lowest decision level that makes the learned clause asserting.
pub fn analyze_conflict(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut VsidsP,
        BinaryClausesP,
        ClauseAllocP,
        ImplGraphP,
        PbConstraintsP,
        SolverConfigP,
        TrailP,
    ),
    conflict: Conflict,
) -> usize {
    split_borrow!(lit_ctx = &(ClauseAllocP, ImplGraphP, PbConstraintsP, TrailP) ctx);

    {
        let analyze = ctx.part_mut(AnalyzeConflictP);

        analyze.clause.clear();
        analyze.involved.clear();
        analyze.current_level_count = 0;
    }

    // We start with all the literals of the conflicted clause
    let conflict_lits = conflict.lits(&lit_ctx);

    if ctx.part(TrailP).current_level() == 0 {
        // Conflict with no decisions, generate empty clause
        if let Conflict::Long(cref) = conflict {
            ctx.part_mut(AnalyzeConflictP).involved.push(cref);
        }
        return 0;
    }

    for &lit in conflict_lits {
        add_literal(ctx.borrow(), lit);
    }

    if let Conflict::Long(cref) = conflict {
        ctx.part_mut(AnalyzeConflictP).involved.push(cref);
    }

    // To get rid of all but one literal of the current level, we resolve the clause with the reason
    // for those literals. The correct order for this is reverse chronological.

    split_borrow!(ctx_trail = &(TrailP) ctx);

    for &lit in ctx_trail.part(TrailP).trail().iter().rev() {
        let analyze = ctx.part_mut(AnalyzeConflictP);
        let lit_present = &mut analyze.var_flags[lit.index()];
        // Is the lit present in the current clause?
        if *lit_present {
            *lit_present = false;
            analyze.current_level_count -= 1;
            if analyze.current_level_count == 0 {
                // lit is the last literal of the current level present in the current clause,
                // therefore the resulting clause will assert !lit so we put in position 0
                analyze.clause.push(!lit);
                let end = analyze.clause.len() - 1;
                analyze.clause.swap(0, end);

                break;
            } else {
                // We removed the literal and now add its reason.
                let (graph, mut ctx) = ctx.split_part(ImplGraphP);

                let reason = graph.reason(lit.var());

                let lits = reason.lits(&lit_ctx);

                for &lit in lits {
                    add_literal(ctx.borrow(), lit);
                }

                if let &Reason::Long(cref) = reason {
                    ctx.part_mut(AnalyzeConflictP).involved.push(cref);
                }
            }
        }
    }

    let binary_algorithm = ctx.part(SolverConfigP).binary_minimization_algorithm;

    if binary_algorithm == BinaryMinimizationAlgorithm::First {
        minimize_with_binary_clauses(ctx.borrow(), false);
    }

    // This needs var_flags set and keeps some var_fags set.
    match ctx.part(SolverConfigP).minimization_algorithm {
        MinimizationAlgorithm::None => (),
        MinimizationAlgorithm::Simple => minimize_clause_simple(ctx.borrow()),
        MinimizationAlgorithm::Recursive => minimize_clause(ctx.borrow()),
        MinimizationAlgorithm::Experimental => {
            minimize_clause_simple(ctx.borrow());
            minimize_clause(ctx.borrow());
        }
    }

    match binary_algorithm {
        BinaryMinimizationAlgorithm::None | BinaryMinimizationAlgorithm::First => (),
        BinaryMinimizationAlgorithm::Reachability => {
            minimize_with_binary_clauses(ctx.borrow(), false)
        }
        BinaryMinimizationAlgorithm::Experimental => minimize_with_binary_clauses(ctx.borrow(), true),
    }

    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);

    for var in analyze.to_clean.drain(..) {
        analyze.var_flags[var.index()] = false;
    }

    // We find the highest level literal besides the asserted literal and move it into position 1.
    // This is important to ensure the watchlist constraints are not violated on backtracking.
    let mut backtrack_to = 0;

    if analyze.clause.len() > 1 {
        let (prefix, rest) = analyze.clause.split_at_mut(2);
        let lit_1 = &mut prefix[1];
        backtrack_to = ctx.part(ImplGraphP).level(lit_1.var());
        for lit in rest.iter_mut() {
            let lit_level = ctx.part(ImplGraphP).level(lit.var());
            if lit_level > backtrack_to {
                backtrack_to = lit_level;
                swap(lit_1, lit);
            }
        }
    }

    ctx.part_mut(VsidsP).decay();

    backtrack_to
}

/// Add a literal to the current clause.
fn add_literal(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut VsidsP,
        ImplGraphP,
        TrailP
    ),
    lit: Lit,
) {
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    let lit_level = ctx.part(ImplGraphP).level(lit.var());
    // No need to add literals that are set by unit clauses or already present
    if lit_level > 0 && !analyze.var_flags[lit.index()] {
        ctx.part_mut(VsidsP).bump(lit.var());

        analyze.var_flags[lit.index()] = true;
        if lit_level == ctx.part(TrailP).current_level() {
            analyze.current_level_count += 1;
        } else {
            analyze.clause.push(lit);
            analyze.to_clean.push(lit.var());
        }
    }
}

/// A Bloom filter of levels.
#[derive(Default)]
struct LevelAbstraction {
    bits: u64,
}

impl LevelAbstraction {
    /// Add a level to the Bloom filter.
    pub fn add(&mut self, level: usize) {
        self.bits |= 1 << (level % 64)
    }

    /// Test whether a level could be in the Bloom filter.
    pub fn test(&self, level: usize) -> bool {
        self.bits & (1 << (level % 64)) != 0
    }
}

/// Performs recursive clause minimization.
///
/// **Note:** Requires AnalyzeConflict's var_flags to be set for exactly the variables of the
/// unminimized claused. This also sets some more var_flags, but lists them in to_clean.
///
/// This routine tries to remove some redundant literals of the learned clause. The idea is to
/// detect literals of the learned clause that are already implied by other literals of the clause.
///
/// This is done by performing a DFS in the implication graph (following edges in reverse) for each
/// literal (apart from the asserting one). The search doesn't expand literals already known to be
/// implied by literals of the clause. When a decision literal that is not in the clause is found,
/// it means that the literal is not redundant.
///
/// There are two optimizations used here: The first one is to stop the search as soon as a literal
/// of a decision level not present in the clause is found. If the DFS would be continued it would
/// at some point reach the decision of that level. That decision belongs to a level not in the
/// clause and thus itself can't be in the clause. Checking whether the decision level is among the
/// clause's decision levels is done approximately using a Bloom filter.
///
/// The other optimization is to avoid duplicating work during the DFS searches. When one literal is
/// found to be redundant that means the whole search stayed within the implied literals. We
/// remember this and will not expand any of these literals for the following DFS searches.
///
/// In this implementation the var_flags array here has two purposes. At the beginning it is set for
/// all the literals of the clause. It is also used to mark the literals visited during the DFS.
/// This allows us to combine the already-visited-check with the literal-present-in-clause check. It
/// also allows for a neat implementation of the second optimization. When the search finds the
/// literal to be non-redundant, we clear var_flags for the literals we visited, resetting it to the
/// state at the beginning of the DFS. When the literal was redundant we keep it as is. This means
/// the following DFS will not expand these literals.
fn minimize_clause(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut VsidsP,
        ClauseAllocP,
        ImplGraphP,
        PbConstraintsP,
        TrailP,
    ),
) {
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    split_borrow!(lit_ctx = &(ClauseAllocP, ImplGraphP, PbConstraintsP, TrailP) ctx);
    let impl_graph = ctx.part(ImplGraphP);

    let mut involved_levels = LevelAbstraction::default();

    for &lit in analyze.clause.iter() {
        involved_levels.add(impl_graph.level(lit.var()));
    }

    let mut scan = VecMutScan::new(&mut analyze.clause);

    // we always keep the first literal
    scan.next();

    'next_lit: while let Some(lit) = scan.next() {
        if impl_graph.reason(lit.var()) == &Reason::Unit {
            continue;
        }

        // Start the DFS
        analyze.stack.clear();
        analyze.stack.push(!*lit);

        // Used to remember which var_flags are set during this DFS
        let top = analyze.to_clean.len();

        while let Some(lit) = analyze.stack.pop() {
            let reason = impl_graph.reason(lit.var());
            let lits = reason.lits(&lit_ctx);

            for &reason_lit in lits {
                let reason_level = impl_graph.level(reason_lit.var());

                if !analyze.var_flags[reason_lit.index()] && reason_level > 0 {
                    // We haven't established reason_lit to be redundant, haven't visited it yet and
                    // it's not implied by unit clauses.

                    if impl_graph.reason(reason_lit.var()) == &Reason::Unit
                        || !involved_levels.test(reason_level)
                    {
                        // reason_lit is a decision not in the clause or in a decision level known
                        // not to be in the clause. Abort the search.

                        // Reset the var_flags set during _this_ DFS.
                        for lit in analyze.to_clean.drain(top..) {
                            analyze.var_flags[lit.index()] = false;
                        }
                        continue 'next_lit;
                    } else {
                        analyze.var_flags[reason_lit.index()] = true;
                        analyze.to_clean.push(reason_lit.var());
                        analyze.stack.push(!reason_lit);
                    }
                }
            }
        }

        lit.remove();
    }
}

/// Simple clause minimization: remove a literal if every literal of its reason is already in the
/// clause or at level 0.
///
/// Unlike `minimize_clause`, this never follows the implication graph past one reason, so it
/// finds fewer redundant literals but does so in a single pass per literal.
fn minimize_clause_simple(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        ClauseAllocP,
        ImplGraphP,
        PbConstraintsP,
        TrailP,
    ),
) {
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    split_borrow!(lit_ctx = &(ClauseAllocP, ImplGraphP, PbConstraintsP, TrailP) ctx);
    let impl_graph = ctx.part(ImplGraphP);

    let mut scan = VecMutScan::new(&mut analyze.clause);

    // we always keep the first literal
    scan.next();

    while let Some(lit) = scan.next() {
        let reason = *impl_graph.reason(lit.var());
        if reason == Reason::Unit {
            continue;
        }

        let redundant = reason.lits(&lit_ctx).iter().all(|reason_lit| {
            impl_graph.level(reason_lit.var()) == 0 || analyze.var_flags[reason_lit.index()]
        });

        if redundant {
            lit.remove();
        }
    }
}

/// Minimizes the learned clause by self-subsumption against the binary implication graph: drops
/// `a` if some other literal `b` of the clause is reachable from `a` (`a -> b`, so `not b -> not
/// a` makes `a` redundant). Same-level cycles are handled by only ever using a literal that
/// itself survives this pass as the qualifying `b`, so a cycle can't be fully erased.
///
/// With `transitive` set, reachability is followed across more than one binary clause instead of
/// stopping after a single hop.
fn minimize_with_binary_clauses(
    mut ctx: partial!(Context, mut AnalyzeConflictP, BinaryClausesP, ImplGraphP),
    transitive: bool,
) {
    let binary_clauses = ctx.part(BinaryClausesP);
    if binary_clauses.count() == 0 {
        return;
    }

    let (analyze, ctx) = ctx.split_part_mut(AnalyzeConflictP);
    if analyze.clause.len() < 2 {
        return;
    }
    let binary_clauses = ctx.part(BinaryClausesP);
    let impl_graph = ctx.part(ImplGraphP);

    let marked: HashSet<Lit> = analyze.clause.iter().copied().collect();
    let mut removed: HashSet<Lit> = HashSet::new();
    let mut keep = vec![true; analyze.clause.len()];

    // the first literal is the asserting one and is never removed.
    for (i, &lit) in analyze.clause.iter().enumerate().skip(1) {
        let lit_level = impl_graph.level(lit.var());

        let qualifies = |implied: Lit| {
            implied != lit
                && marked.contains(&implied)
                && !(lit_level == impl_graph.level(implied.var()) && removed.contains(&implied))
        };

        let redundant = if transitive {
            reachable_marked_literal(binary_clauses, lit, qualifies)
        } else {
            binary_clauses.implied(lit).iter().any(|&implied| qualifies(implied))
        };

        if redundant {
            keep[i] = false;
            removed.insert(lit);
        }
    }

    let mut i = 0;
    analyze.clause.retain(|_| {
        let keep_this = keep[i];
        i += 1;
        keep_this
    });
}

/// Depth-first search over the binary implication graph for a literal satisfying `qualifies`,
/// starting from (but not including) `start` itself.
fn reachable_marked_literal(
    binary_clauses: &BinaryClauses,
    start: Lit,
    qualifies: impl Fn(Lit) -> bool,
) -> bool {
    let mut stack = vec![start];
    let mut visited = HashSet::new();
    visited.insert(start);

    while let Some(lit) = stack.pop() {
        for &implied in binary_clauses.implied(lit) {
            if qualifies(implied) {
                return true;
            }
            if visited.insert(implied) {
                stack.push(implied);
            }
        }
    }
    false
}

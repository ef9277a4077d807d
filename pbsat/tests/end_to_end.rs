//! End to end tests exercising the public `Solver` API.

use pbsat::{SolveResult, Solver, SolverConfigUpdate};
use pbsat_formula::Lit;

fn lit(dimacs: isize) -> Lit {
    Lit::from_dimacs(dimacs)
}

#[test]
fn dimacs_cnf_sat() {
    let mut solver = Solver::new();

    solver
        .add_dimacs_cnf(&b"p cnf 3 2\n1 2 3 0\n-1 -2 0\n"[..])
        .unwrap();

    assert_eq!(solver.solve(), SolveResult::Sat);

    let model = solver.model().unwrap();
    assert!(model.contains(&lit(1)) || model.contains(&lit(2)) || model.contains(&lit(3)));
    assert!(!(model.contains(&lit(1)) && model.contains(&lit(2))));
}

#[test]
fn dimacs_cnf_unsat() {
    let mut solver = Solver::new();

    solver
        .add_dimacs_cnf(&b"p cnf 1 2\n1 0\n-1 0\n"[..])
        .unwrap();

    assert_eq!(solver.solve(), SolveResult::Unsat);
    assert!(solver.unsat_core().unwrap().iter().any(|&l| l == lit(1)));
}

#[test]
fn at_most_two_of_four_pb_constraint() {
    let mut solver = Solver::new();
    solver.ensure_var_count(4);

    let lits = [lit(1), lit(2), lit(3), lit(4)];
    let terms: Vec<(i64, Lit)> = lits.iter().map(|&l| (1, l)).collect();

    assert!(solver.add_pb_constraint(&terms, 2));

    solver.add_clause(&[lit(1)]);
    solver.add_clause(&[lit(2)]);
    solver.add_clause(&[lit(3)]);

    assert_eq!(solver.solve(), SolveResult::Unsat);
}

#[test]
fn double_bounded_linear_constraint_forces_exact_count() {
    let mut solver = Solver::new();
    solver.ensure_var_count(3);

    let terms: Vec<(i64, Lit)> = [lit(1), lit(2), lit(3)].iter().map(|&l| (1, l)).collect();

    // Exactly two of the three literals must be true.
    assert!(solver.add_linear_constraint(true, 2, true, 2, &terms));

    assert_eq!(solver.solve(), SolveResult::Sat);

    let model = solver.model().unwrap();
    let true_count = terms
        .iter()
        .filter(|&&(_, l)| model.contains(&l))
        .count();
    assert_eq!(true_count, 2);
}

#[test]
fn assumptions_yield_unsat_under_assumptions_and_recover() {
    let mut solver = Solver::new();
    solver.ensure_var_count(2);

    solver.add_clause(&[lit(1), lit(2)]);
    solver.add_clause(&[!lit(1), lit(2)]);
    solver.add_clause(&[lit(1), !lit(2)]);

    solver.set_assumptions(&[!lit(1), !lit(2)]);
    assert_eq!(solver.solve(), SolveResult::UnsatUnderAssumptions);
    assert!(!solver.failed_core().unwrap().is_empty());

    solver.set_assumptions(&[]);
    assert_eq!(solver.solve(), SolveResult::Sat);
}

/// DIMACS CNF encoding the pigeonhole principle for `pigeons` pigeons and `holes` holes:
/// unsatisfiable whenever `pigeons > holes`, and hard enough for a CDCL solver to need more
/// than one conflict to refute.
fn pigeonhole_cnf(pigeons: usize, holes: usize) -> String {
    let var = |pigeon: usize, hole: usize| -> isize { (pigeon * holes + hole + 1) as isize };

    let mut clauses = Vec::new();
    for pigeon in 0..pigeons {
        let clause: Vec<String> = (0..holes).map(|hole| var(pigeon, hole).to_string()).collect();
        clauses.push(clause.join(" "));
    }
    for hole in 0..holes {
        for p1 in 0..pigeons {
            for p2 in (p1 + 1)..pigeons {
                clauses.push(format!("-{} -{}", var(p1, hole), var(p2, hole)));
            }
        }
    }

    let mut dimacs = format!("p cnf {} {}\n", pigeons * holes, clauses.len());
    for clause in clauses {
        dimacs.push_str(&clause);
        dimacs.push_str(" 0\n");
    }
    dimacs
}

#[test]
fn max_conflicts_limit_reports_limit_reached() {
    let mut solver = Solver::new();

    let mut update = SolverConfigUpdate::default();
    update.max_number_of_conflicts = Some(Some(1));
    solver.set_config(&update);

    // Pigeonhole instances need many conflicts to refute, so allowing only one can't finish.
    let cnf = pigeonhole_cnf(5, 4);
    solver.add_dimacs_cnf(cnf.as_bytes()).unwrap();

    assert_eq!(solver.solve(), SolveResult::LimitReached);
}

#[test]
fn pigeonhole_instance_is_unsat_without_a_conflict_limit() {
    let mut solver = Solver::new();

    let cnf = pigeonhole_cnf(5, 4);
    solver.add_dimacs_cnf(cnf.as_bytes()).unwrap();

    assert_eq!(solver.solve(), SolveResult::Unsat);
}

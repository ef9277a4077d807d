//! Library-facing error type for fallible [`Solver`](crate::Solver) operations.
use std::io;

use thiserror::Error;

use pbsat_dimacs::ParserError;

/// Errors returned by [`Solver::add_dimacs_cnf`](crate::Solver::add_dimacs_cnf).
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("I/O error reading input: {0}")]
    Io(#[from] io::Error),
    #[error("error parsing DIMACS CNF input: {0}")]
    Dimacs(#[from] ParserError),
}

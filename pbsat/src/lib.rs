//! A CDCL SAT and pseudo-Boolean constraint solver core.

mod analyze_conflict;
mod assumptions;
mod binary;
mod cdcl;
mod clause;
mod config;
mod context;
mod decision;
mod error;
mod glue;
mod load;
mod model;
mod pb;
mod pb_analyze;
mod prop;
mod schedule;
mod simplify;
mod solver;
mod state;
mod tmp;

mod vec_mut_scan;

pub use config::{
    BinaryMinimizationAlgorithm, InitialPolarity, MinimizationAlgorithm, SolverConfig,
    SolverConfigUpdate, VariableOrder,
};
pub use error::SolverError;
pub use pb::PbConstraint;
pub use solver::{SolveResult, Solver};

pub use pbsat_formula::{Lit, Var};

//! Model reconstruction.

use partial_ref::{partial, PartialRef};

use pbsat_formula::Lit;

use crate::context::{AssignmentP, Context, ModelP, SolverStateP};
use crate::state::SatState;

/// A satisfying assignment.
#[derive(Default)]
pub struct Model {
    /// Assignment of the model.
    ///
    /// Whenever the solver state is `Sat` this must be up to date.
    assignment: Vec<Option<bool>>,
}

impl Model {
    /// Assignment of the model.
    ///
    /// Only valid if the solver state is `Sat`.
    pub fn assignment(&self) -> &[Option<bool>] {
        &self.assignment
    }

    /// Whether a given literal is true in the model assignment.
    ///
    /// Only valid if the solver state is `Sat`.
    pub fn lit_is_true(&self, lit: Lit) -> bool {
        self.assignment[lit.index()] == Some(lit.is_positive())
    }
}

/// Snapshot the current assignment into the model and mark the solver as satisfied.
///
/// Called once propagation and decisions have produced a full assignment.
pub fn reconstruct_model(
    mut ctx: partial!(Context, mut ModelP, mut SolverStateP, AssignmentP),
) {
    let (model, mut ctx) = ctx.split_part_mut(ModelP);

    model.assignment.clear();
    model
        .assignment
        .extend_from_slice(ctx.part(AssignmentP).assignment());

    ctx.part_mut(SolverStateP).sat_state = SatState::Sat;
}

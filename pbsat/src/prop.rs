//! Unit propagation.
pub mod assignment;
pub mod binary;
pub mod graph;
pub mod long;
pub mod watch;

pub use assignment::{backtrack, enqueue_assignment, full_restart, restart, Assignment, Trail};
pub use binary::propagate_binary;
pub use graph::{Conflict, ImplGraph, ImplNode, Reason};
pub use long::propagate_long;
pub use watch::{Watch, Watchlists};

use partial_ref::{partial, PartialRef};

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, Context, ImplGraphP, PbConstraintsP, TrailP,
    WatchlistsP,
};
use crate::pb::{propagate_pb, PbRef};

/// A propagation-time conflict: either a falsified clause/binary clause or a falsified PB
/// constraint.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PropagationConflict {
    Clause(Conflict),
    Pb(PbRef),
}

impl From<Conflict> for PropagationConflict {
    fn from(conflict: Conflict) -> PropagationConflict {
        PropagationConflict::Clause(conflict)
    }
}

/// Propagate all literals currently enqueued on the trail.
///
/// Stops and returns the conflict as soon as one is found. The trail is left as is on conflict,
/// ready for conflict analysis.
pub fn propagate(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut TrailP,
        mut WatchlistsP,
        mut ClauseAllocP,
        mut PbConstraintsP,
        BinaryClausesP,
    ),
) -> Result<(), PropagationConflict> {
    while let Some(lit) = ctx.part_mut(TrailP).pop_queue() {
        propagate_binary(ctx.borrow(), lit)?;
        propagate_long(ctx.borrow(), lit)?;
        propagate_pb(ctx.borrow(), lit)?;
    }
    Ok(())
}

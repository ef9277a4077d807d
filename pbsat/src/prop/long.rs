//! Propagation of long clauses.
use partial_ref::{partial, PartialRef};

use crate::context::{AssignmentP, ClauseAllocP, Context, ImplGraphP, TrailP, WatchlistsP};
use pbsat_formula::Lit;

use super::enqueue_assignment;
use super::{Conflict, Reason, Watch};

/// Propagate all literals implied by long clauses watched by the given literal.
///
/// On conflict return the clause propgating the conflicting assignment.
///
/// See [`prop::watch`](crate::prop::watch) for the invariants that this has to uphold.
pub fn propagate_long(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut TrailP,
        mut WatchlistsP,
        mut ClauseAllocP,
    ),
    lit: Lit,
) -> Result<(), Conflict> {
    let (watchlists, mut ctx) = ctx.split_part_mut(WatchlistsP);

    let watches = std::mem::take(watchlists.watched_by_mut(lit));
    let false_lit = !lit;

    let mut retained = Vec::with_capacity(watches.len());
    let mut to_add: Vec<(Lit, Watch)> = vec![];

    let mut index = 0;
    while index < watches.len() {
        let watch = watches[index];
        index += 1;

        if ctx.part(AssignmentP).lit_is_true(watch.blocking) {
            retained.push(watch);
            continue;
        }

        let cref = watch.cref;

        let lits = ctx.part_mut(ClauseAllocP).clause_mut(cref).lits_mut();
        if lits[0] == false_lit {
            lits.swap(0, 1);
        }
        let first = lits[0];

        let new_watch = Watch {
            cref,
            blocking: first,
        };

        if first != watch.blocking && ctx.part(AssignmentP).lit_is_true(first) {
            retained.push(new_watch);
            continue;
        }

        let assignment = ctx.part(AssignmentP);
        let lits = ctx.part_mut(ClauseAllocP).clause_mut(cref).lits_mut();
        let mut found = None;
        for (offset, &candidate) in lits[2..].iter().enumerate() {
            if !assignment.lit_is_false(candidate) {
                found = Some(offset + 2);
                break;
            }
        }

        if let Some(i) = found {
            lits.swap(1, i);
            let rest_lit = lits[1];
            assert_ne!(!rest_lit, lit);
            to_add.push((!rest_lit, new_watch));
            continue;
        }

        retained.push(new_watch);

        if ctx.part(AssignmentP).lit_is_false(first) {
            retained.extend_from_slice(&watches[index..]);
            *watchlists.watched_by_mut(lit) = retained;
            for (target, w) in to_add {
                watchlists.add_watch(target, w);
            }
            return Err(Conflict::Long(cref));
        }

        enqueue_assignment(ctx.borrow(), first, Reason::Long(cref));
    }

    *watchlists.watched_by_mut(lit) = retained;
    for (target, w) in to_add {
        watchlists.add_watch(target, w);
    }

    Ok(())
}

//! Clause allocator.
use pbsat_formula::Lit;

use super::{Clause, ClauseHeader};

/// Arena for clause storage.
///
/// Clauses are never freed individually; entries are marked deleted in their header and reclaimed
/// in bulk by [`ClauseDb::collect_garbage`](super::ClauseDb::collect_garbage), which copies the
/// surviving clauses into a fresh `ClauseAlloc` and remaps every `ClauseRef`.
///
/// This is a safe, indexed replacement for a `#[repr(transparent)]` bump allocator over
/// `[LitIdx]`: every access goes through ordinary `Vec` indexing and bounds checks, at the cost of
/// one extra `Vec<Lit>` allocation per clause compared to a flat buffer.
#[derive(Default)]
pub struct ClauseAlloc {
    clauses: Vec<Clause>,
}

impl ClauseAlloc {
    /// Create an empty clause allocator.
    pub fn new() -> ClauseAlloc {
        ClauseAlloc::default()
    }

    /// Create a clause allocator with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> ClauseAlloc {
        ClauseAlloc {
            clauses: Vec::with_capacity(capacity),
        }
    }

    /// Allocate space for and add a new clause.
    ///
    /// Clauses have a minimal size of 3, as binary and unit clauses are handled separately.
    pub fn add_clause(&mut self, mut header: ClauseHeader, lits: &[Lit]) -> ClauseRef {
        assert!(
            lits.len() >= 3,
            "ClauseAlloc can only store ternary and larger clauses"
        );

        header.set_len(lits.len());

        let index = self.clauses.len();

        self.clauses.push(Clause {
            header,
            lits: lits.to_vec(),
        });

        ClauseRef {
            index: index as u32,
        }
    }

    /// Access the header of a clause.
    pub fn header(&self, cref: ClauseRef) -> &ClauseHeader {
        self.clause(cref).header()
    }

    /// Mutate the header of a clause.
    pub fn header_mut(&mut self, cref: ClauseRef) -> &mut ClauseHeader {
        self.clause_mut(cref).header_mut()
    }

    /// Access a clause.
    pub fn clause(&self, cref: ClauseRef) -> &Clause {
        &self.clauses[cref.index as usize]
    }

    /// Mutate a clause.
    pub fn clause_mut(&mut self, cref: ClauseRef) -> &mut Clause {
        &mut self.clauses[cref.index as usize]
    }

    /// Current number of clauses, including ones marked deleted but not yet collected.
    pub fn buffer_size(&self) -> usize {
        self.clauses.len()
    }
}

/// Reference to a clause stored in a [`ClauseAlloc`].
///
/// Only valid for the `ClauseAlloc` that produced it. Becomes stale across a garbage collection
/// pass; callers that keep a `ClauseRef` alive across one (e.g. trail reasons) are remapped by
/// [`ClauseDb::collect_garbage_now`](super::ClauseDb::collect_garbage_now).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct ClauseRef {
    index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    use pbsat_formula::cnf::{strategy::*, CnfFormula};

    use proptest::*;

    proptest! {
        #[test]
        fn roundtrip_from_cnf_formula(input in cnf_formula(1..100usize, 0..1000, 3..30)) {

            let mut clause_alloc = ClauseAlloc::new();
            let mut clause_refs = vec![];

            for clause_lits in input.iter() {
                let header = ClauseHeader::new();
                clause_refs.push(clause_alloc.add_clause(header, clause_lits));
            }

            let mut recovered = CnfFormula::new();

            for cref in clause_refs {
                let clause = clause_alloc.clause(cref);
                prop_assert_eq!(clause.header().len(), clause.lits().len());
                recovered.add_clause(clause.lits());
            }

            // Ignore difference caused by unused vars
            recovered.set_var_count(input.var_count());

            prop_assert_eq!(input, recovered);
        }

        #[test]
        fn clause_mutation(input in cnf_formula(1..100usize, 0..1000, 3..30)) {

            let mut clause_alloc = ClauseAlloc::new();
            let mut clause_refs = vec![];

            for clause_lits in input.iter() {
                let header = ClauseHeader::new();
                clause_refs.push(clause_alloc.add_clause(header, clause_lits));
            }

            for &cref in clause_refs.iter() {
                let clause = clause_alloc.clause_mut(cref);
                clause.lits_mut().reverse();
            }

            for &cref in clause_refs.iter() {
                let clause_len = clause_alloc.clause(cref).lits().len();
                if clause_len > 3 {
                    clause_alloc.header_mut(cref).set_len(clause_len - 1);
                }
            }

            for (&cref, lits) in clause_refs.iter().zip(input.iter()) {
                let expected = if lits.len() > 3 {
                    lits[1..].iter().rev()
                } else {
                    lits.iter().rev()
                };
                prop_assert!(clause_alloc.clause(cref).lits().iter().eq(expected));
            }
        }
    }
}

//! Canonical atom ranking: Morgan-style refinement of atom invariants, with a
//! bounded individualization search to break the ties refinement leaves.

use std::collections::BTreeMap;

use tracing::*;

use crate::molecule::*;

/// The per-atom invariant refinement starts from.
///
/// Built from graph topology only: SSSR membership depends on atom ids when
/// the smallest basis is not unique.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtomInvariant {
    pub atomic_number: u8,
    pub isotope: u16,
    pub charge: i8,
    pub degree: usize,
    pub hydrogens: usize,
    pub aromatic: bool,
    pub in_ring: bool,
    /// Bonds of this atom that lie on a cycle.
    pub ring_bonds: usize,
}

/// Invariants of an enriched molecule, indexed by atom.
pub fn atom_invariants(mol: &Molecule) -> Vec<AtomInvariant> {
    mol.atoms()
        .map(|id| {
            let atom = mol.atom(id);
            AtomInvariant {
                atomic_number: atom.element.atomic_number(),
                isotope: atom.isotope.unwrap_or(0),
                charge: atom.charge,
                degree: mol.degree(id),
                hydrogens: mol.total_hydrogens(id),
                aromatic: atom.aromatic,
                in_ring: atom.in_ring,
                ring_bonds: mol.bonds_of(id).filter(|&(_, bond)| mol.bond(bond).in_ring).count(),
            }
        })
        .collect()
}

/// Dense ranks (0, 1, 2, ...) of `keys`, equal keys sharing a rank.
fn dense_ranks<K: Ord + Clone>(keys: &[K]) -> Vec<usize> {
    let mut sorted: Vec<K> = keys.to_vec();
    sorted.sort();
    sorted.dedup();
    let positions: BTreeMap<&K, usize> = sorted.iter().enumerate().map(|(rank, key)| (key, rank)).collect();
    keys.iter().map(|key| positions[key]).collect()
}

fn class_count(ranks: &[usize]) -> usize {
    ranks.iter().max().map_or(0, |&max| max + 1)
}

fn bond_code(order: BondOrder) -> u8 {
    match order {
        BondOrder::Single => 1,
        BondOrder::Double => 2,
        BondOrder::Triple => 3,
        BondOrder::Aromatic => 4,
    }
}

/// Refines `ranks` by neighbour ranks and bond orders until the number of
/// classes stops growing. Refinement only ever splits classes.
pub fn morgan_ranks(mol: &Molecule, ranks: &[usize]) -> Vec<usize> {
    let mut ranks = ranks.to_vec();
    loop {
        let keys: Vec<(usize, Vec<(usize, u8)>)> = mol
            .atoms()
            .map(|id| {
                let mut neighbors: Vec<(usize, u8)> = mol
                    .bonds_of(id)
                    .map(|(other, bond)| (ranks[other.index()], bond_code(mol.bond(bond).order)))
                    .collect();
                neighbors.sort();
                (ranks[id.index()], neighbors)
            })
            .collect();
        let refined = dense_ranks(&keys);
        if class_count(&refined) == class_count(&ranks) {
            return refined;
        }
        ranks = refined;
    }
}

/// Separate `atom` from the rest of its class, ranking it first.
fn individualize(ranks: &[usize], atom: usize) -> Vec<usize> {
    let keys: Vec<(usize, bool)> = ranks
        .iter()
        .enumerate()
        .map(|(index, &rank)| (rank, index != atom))
        .collect();
    dense_ranks(&keys)
}

/// The outcome of canonical ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRanking {
    /// A total order: every atom has a distinct rank.
    pub ranks: Vec<usize>,
    /// The rendering the ranks produce.
    pub text: String,
    /// Leaves of the tie-break search that were rendered.
    pub leaves: usize,
    /// The search stopped at its leaf limit before trying every tie.
    pub truncated: bool,
}

struct TieBreaker<'a, F> {
    mol: &'a Molecule,
    render: F,
    max_leaves: usize,
    leaves: usize,
    truncated: bool,
    best: Option<(String, Vec<usize>)>,
}

impl<'a, F> TieBreaker<'a, F> {
    fn search<E>(&mut self, ranks: Vec<usize>) -> Result<(), E>
    where
        F: FnMut(&[usize]) -> Result<String, E>,
    {
        let mut sizes = vec![0usize; ranks.len()];
        for &rank in &ranks {
            sizes[rank] += 1;
        }
        let tied = match sizes.iter().position(|&size| size > 1) {
            Some(rank) => rank,
            None => {
                self.leaves += 1;
                let text = (self.render)(&ranks)?;
                if self.best.as_ref().map_or(true, |(best, _)| text < *best) {
                    self.best = Some((text, ranks));
                }
                return Ok(());
            }
        };

        let members: Vec<usize> = (0..ranks.len()).filter(|&i| ranks[i] == tied).collect();
        for member in members {
            if self.best.is_some() && self.leaves >= self.max_leaves {
                self.truncated = true;
                break;
            }
            let split = morgan_ranks(self.mol, &individualize(&ranks, member));
            self.search(split)?;
        }
        Ok(())
    }
}

/// Ranks every atom so that equivalent molecules get the same rendering.
///
/// # Arguments
///
/// * `mol` - An enriched molecule.
/// * `max_leaves` - How many fully ordered candidates the tie-break search may render.
/// * `render` - Renders the molecule for a total order; the smallest string wins.
///
/// # Returns
///
/// * `Result<CanonicalRanking, E>` - The winning order and its rendering, or the
///   first rendering error.
#[instrument(skip_all, fields(atoms = mol.atom_count(), max_leaves = max_leaves))]
pub fn canonical_ranking<E, F>(mol: &Molecule, max_leaves: usize, render: F) -> Result<CanonicalRanking, E>
where
    F: FnMut(&[usize]) -> Result<String, E>,
{
    let initial = dense_ranks(&atom_invariants(mol));
    let refined = morgan_ranks(mol, &initial);
    trace!("Refinement found {} of {} classes", class_count(&refined), mol.atom_count());

    let mut breaker = TieBreaker {
        mol,
        render,
        max_leaves: max_leaves.max(1),
        leaves: 0,
        truncated: false,
        best: None,
    };
    breaker.search(refined)?;
    if breaker.truncated {
        warn!("Canonical search stopped after {} leaves; output may depend on input order", breaker.leaves);
    }
    let (text, ranks) = breaker.best.unwrap_or_default();
    Ok(CanonicalRanking {
        ranks,
        text,
        leaves: breaker.leaves,
        truncated: breaker.truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::ensure_enriched;
    use crate::parse::parse_molecule;

    fn refined(smiles: &str) -> (Molecule, Vec<usize>) {
        let mut mol = parse_molecule(smiles).expect("Failed to parse SMILES");
        ensure_enriched(&mut mol);
        let initial = dense_ranks(&atom_invariants(&mol));
        let ranks = morgan_ranks(&mol, &initial);
        (mol, ranks)
    }

    #[test]
    fn test_dense_ranks() {
        assert_eq!(dense_ranks(&[5, 1, 5, 3]), vec![2, 0, 2, 1]);
        assert_eq!(individualize(&[0, 1, 1, 2], 2), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_refinement_separates_chain_positions() {
        let (_, ranks) = refined("CCCC");
        assert_eq!(ranks[0], ranks[3]);
        assert_eq!(ranks[1], ranks[2]);
        assert_ne!(ranks[0], ranks[1]);
        let (_, ranks) = refined("OCC");
        assert_eq!(class_count(&ranks), 3);
    }

    #[test]
    fn test_invariants_count_ring_bonds() {
        let (mol, _) = refined("c1ccc2ccccc2c1");
        let invariants = atom_invariants(&mol);
        assert_eq!(invariants[0].ring_bonds, 2);
        assert_eq!(invariants[3].ring_bonds, 3);
        let (mol, _) = refined("C1CC1CC");
        let invariants = atom_invariants(&mol);
        assert_eq!(invariants[2].ring_bonds, 2);
        assert_eq!(invariants[3].ring_bonds, 0);
    }

    #[test]
    fn test_symmetric_ring_stays_tied() {
        let (_, ranks) = refined("C1CCCCC1");
        assert_eq!(class_count(&ranks), 1);
    }

    #[test]
    fn test_tie_break_gives_total_order() {
        let (mol, _) = refined("C1CCCCC1");
        let ranking = canonical_ranking(&mol, 64, |ranks| {
            Ok::<_, ()>(ranks.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(","))
        })
        .expect("render never fails");
        let mut sorted = ranking.ranks.clone();
        sorted.sort();
        assert_eq!(sorted, (0..6).collect::<Vec<_>>());
        assert!(ranking.leaves >= 1);
    }

    #[test]
    fn test_leaf_limit_truncates() {
        let (mol, _) = refined("C1CCCCC1");
        let ranking = canonical_ranking(&mol, 1, |_| Ok::<_, ()>(String::from("x"))).expect("render never fails");
        assert_eq!(ranking.leaves, 1);
        assert!(ranking.truncated);
    }
}

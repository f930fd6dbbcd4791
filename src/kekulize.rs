//! Kekulization: alternating single/double bonds for aromatic systems.

use std::collections::{BTreeSet, VecDeque};

use thiserror::Error;
use tracing::*;

use crate::enrich::ensure_enriched;
use crate::molecule::*;

const MAX_BACKTRACK_STEPS: usize = 200_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KekulizeError {
    #[error("Cannot kekulize aromatic system: unmatched atoms {0:?}")]
    Unkekulizable(Vec<usize>),
    #[error("Kekulization gave up after {0} search steps")]
    SearchLimit(usize),
}

/// Does this atom need one of its aromatic bonds to become double?
fn needs_double(mol: &Molecule, id: AtomId) -> bool {
    let atom = mol.atom(id);
    let used = mol.bond_order_sum(id) + atom.hydrogens() as usize;
    atom.element
        .allowed_valences(atom.charge)
        .into_iter()
        .map(usize::from)
        .find(|&v| v >= used)
        .map_or(false, |target| target - used == 1)
}

type Mates = Vec<Option<(AtomId, BondId)>>;

/// Kuhn-style augmenting path from `v`. Does not shrink odd cycles, so it can
/// miss a perfect matching that exists; the exhaustive pass covers that.
fn augment(v: AtomId, adjacency: &[Vec<(AtomId, BondId)>], mates: &mut Mates, visited: &mut [bool]) -> bool {
    for &(w, bond) in &adjacency[v.index()] {
        if visited[w.index()] {
            continue;
        }
        visited[w.index()] = true;
        let free = match mates[w.index()] {
            None => true,
            Some((partner, _)) => {
                visited[partner.index()] = true;
                augment(partner, adjacency, mates, visited)
            }
        };
        if free {
            mates[v.index()] = Some((w, bond));
            mates[w.index()] = Some((v, bond));
            return true;
        }
    }
    false
}

/// Exhaustive matching over `order`, for systems the augmenting pass could not finish.
fn backtrack(
    order: &[AtomId],
    adjacency: &[Vec<(AtomId, BondId)>],
    mates: &mut Mates,
    steps: &mut usize,
) -> Result<bool, KekulizeError> {
    let v = match order.iter().find(|v| mates[v.index()].is_none()) {
        Some(&v) => v,
        None => return Ok(true),
    };
    for &(w, bond) in &adjacency[v.index()] {
        if mates[w.index()].is_some() {
            continue;
        }
        *steps += 1;
        if *steps > MAX_BACKTRACK_STEPS {
            return Err(KekulizeError::SearchLimit(*steps));
        }
        mates[v.index()] = Some((w, bond));
        mates[w.index()] = Some((v, bond));
        if backtrack(order, adjacency, mates, steps)? {
            return Ok(true);
        }
        mates[v.index()] = None;
        mates[w.index()] = None;
    }
    Ok(false)
}

/// Choose which of `bonds` (aromatic bonds) become double.
///
/// Every endpoint that needs a double bond gets exactly one.
pub(crate) fn assign_double_bonds(mol: &Molecule, bonds: &[BondId]) -> Result<BTreeSet<BondId>, KekulizeError> {
    let n = mol.atom_count();
    let mut atoms = BTreeSet::new();
    for &bond in bonds {
        if let Some((a, b)) = mol.bond_endpoints(bond) {
            atoms.insert(a);
            atoms.insert(b);
        }
    }
    let chosen: BTreeSet<BondId> = bonds.iter().copied().collect();
    // An atom that keeps other aromatic bonds gets its π bond from them.
    let needy: Vec<bool> = (0..n)
        .map(|i| {
            let id = AtomId::new(i);
            atoms.contains(&id)
                && needs_double(mol, id)
                && !mol
                    .bonds_of(id)
                    .any(|(_, bond)| mol.bond(bond).order == BondOrder::Aromatic && !chosen.contains(&bond))
        })
        .collect();

    let mut adjacency: Vec<Vec<(AtomId, BondId)>> = vec![Vec::new(); n];
    for &bond in bonds {
        if let Some((a, b)) = mol.bond_endpoints(bond) {
            if needy[a.index()] && needy[b.index()] {
                adjacency[a.index()].push((b, bond));
                adjacency[b.index()].push((a, bond));
            }
        }
    }

    // Breadth-first order keeps each atom next to the atoms matched before it.
    let mut order = Vec::new();
    let mut seen = vec![false; n];
    for &start in atoms.iter().filter(|a| needy[a.index()]) {
        if seen[start.index()] {
            continue;
        }
        seen[start.index()] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(v) = queue.pop_front() {
            order.push(v);
            for &(w, _) in &adjacency[v.index()] {
                if !seen[w.index()] {
                    seen[w.index()] = true;
                    queue.push_back(w);
                }
            }
        }
    }

    let mut mates: Mates = vec![None; n];
    for &v in &order {
        if mates[v.index()].is_some() {
            continue;
        }
        let mut visited = vec![false; n];
        visited[v.index()] = true;
        augment(v, &adjacency, &mut mates, &mut visited);
    }

    if order.iter().any(|v| mates[v.index()].is_none()) {
        debug!("Augmenting pass left atoms unmatched, searching exhaustively");
        let mut exhaustive: Mates = vec![None; n];
        let mut steps = 0;
        if backtrack(&order, &adjacency, &mut exhaustive, &mut steps)? {
            mates = exhaustive;
        } else {
            let unmatched: Vec<usize> = order
                .iter()
                .filter(|v| mates[v.index()].is_none())
                .map(|v| v.index())
                .collect();
            return Err(KekulizeError::Unkekulizable(unmatched));
        }
    }

    Ok(mates.into_iter().flatten().map(|(_, bond)| bond).collect())
}

/// Replace `bonds` with single/double bonds and clear the aromatic flag of
/// atoms left without aromatic bonds.
pub(crate) fn kekulize_bonds(mol: &mut Molecule, bonds: &[BondId]) -> Result<(), KekulizeError> {
    let doubles = assign_double_bonds(mol, bonds)?;
    let mut touched = BTreeSet::new();
    for &bond in bonds {
        if let Some((a, b)) = mol.bond_endpoints(bond) {
            touched.insert(a);
            touched.insert(b);
        }
        let order = if doubles.contains(&bond) {
            BondOrder::Double
        } else {
            BondOrder::Single
        };
        mol.graph_mut()[bond].order = order;
    }
    for atom in touched {
        let still_aromatic = mol
            .bonds_of(atom)
            .any(|(_, bond)| mol.bond(bond).order == BondOrder::Aromatic);
        if !still_aromatic {
            mol.graph_mut()[atom].aromatic = false;
        }
    }
    Ok(())
}

/// Rewrites every aromatic bond as single or double and clears aromatic flags.
///
/// Hydrogen counts are derived first, so the molecule keeps its implicit
/// hydrogens. On failure the molecule is left unchanged.
pub fn kekulize(mol: &mut Molecule) -> Result<(), KekulizeError> {
    ensure_enriched(mol);
    let aromatic: Vec<BondId> = mol
        .bonds()
        .filter(|&bond| mol.bond(bond).order == BondOrder::Aromatic)
        .collect();
    kekulize_bonds(mol, &aromatic)?;
    for atom in mol.atoms().collect::<Vec<_>>() {
        mol.graph_mut()[atom].aromatic = false;
    }
    trace!("Kekulized {} aromatic bonds", aromatic.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_molecule;

    fn kekulized(smiles: &str) -> Result<Molecule, KekulizeError> {
        let mut mol = parse_molecule(smiles).expect("Failed to parse SMILES");
        kekulize(&mut mol)?;
        Ok(mol)
    }

    fn double_count(mol: &Molecule) -> usize {
        mol.bonds().filter(|&b| mol.bond(b).order == BondOrder::Double).count()
    }

    #[test]
    fn test_kekulize_benzene() {
        let mol = kekulized("c1ccccc1").expect("Failed to kekulize");
        assert_eq!(double_count(&mol), 3);
        assert!(mol.atoms().all(|a| !mol.atom(a).aromatic && mol.atom(a).hydrogens() == 1));
        assert!(mol.atoms().all(|a| mol.bond_order_sum(a) == 3));
    }

    #[test]
    fn test_kekulize_heterocycles() {
        assert_eq!(double_count(&kekulized("c1ccncc1").expect("pyridine")), 3);
        assert_eq!(double_count(&kekulized("c1cc[nH]c1").expect("pyrrole")), 2);
        assert_eq!(double_count(&kekulized("c1ccoc1").expect("furan")), 2);
        assert_eq!(double_count(&kekulized("c1ccsc1").expect("thiophene")), 2);
        assert_eq!(double_count(&kekulized("c1ccc2ccccc2c1").expect("naphthalene")), 5);
        assert_eq!(double_count(&kekulized("c1ccc2[nH]ccc2c1").expect("indole")), 4);
    }

    #[test]
    fn test_unkekulizable() {
        assert!(matches!(kekulized("c1cccc1"), Err(KekulizeError::Unkekulizable(_))));
    }

    #[test]
    fn test_non_aromatic_untouched() {
        let mol = kekulized("C=CC#N").expect("Failed to kekulize");
        assert_eq!(double_count(&mol), 1);
    }
}

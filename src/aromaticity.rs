//! Aromaticity perception with a Hückel π-electron count per SSSR ring.

use tracing::*;

use crate::enrich::ensure_enriched;
use crate::kekulize::{kekulize_bonds, KekulizeError};
use crate::molecule::*;
use crate::rings::{assign_ring_ids, find_rings, Ring, RingLimits, RingStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AromaticityOptions {
    /// Smallest ring size that may be aromatic.
    pub min_ring_size: usize,
    /// Largest ring size that may be aromatic. Larger (macrocyclic) aromatic
    /// rings are never detected.
    pub max_ring_size: usize,
    pub ring_limits: RingLimits,
}

impl Default for AromaticityOptions {
    fn default() -> Self {
        Self {
            min_ring_size: 5,
            max_ring_size: 7,
            ring_limits: RingLimits::default(),
        }
    }
}

impl AromaticityOptions {
    pub fn with_ring_window(mut self, min: usize, max: usize) -> Self {
        self.min_ring_size = min;
        self.max_ring_size = max;
        self
    }

    pub fn with_ring_limits(mut self, limits: RingLimits) -> Self {
        self.ring_limits = limits;
        self
    }

    fn in_window(&self, size: usize) -> bool {
        (self.min_ring_size..=self.max_ring_size).contains(&size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AromaticityReport {
    /// Ids of the rings whose atoms and bonds are all aromatic afterwards.
    pub aromatic_rings: Vec<usize>,
    pub aromatic_atoms: usize,
    /// Atoms of accepted rings dropped for an exocyclic double bond.
    pub excluded_atoms: Vec<AtomId>,
    /// Input aromatic bonds rewritten as single or double.
    pub dearomatized_bonds: usize,
    /// Set when input aromatic bonds could not be given a Kekulé form; their
    /// aromatic flags are left in place.
    pub kekulize_failure: Option<KekulizeError>,
    pub ring_status: RingStatus,
}

pub fn huckel(electrons: u32) -> bool {
    electrons >= 2 && (electrons - 2) % 4 == 0
}

fn is_pnictogen(atomic_number: u8) -> bool {
    matches!(atomic_number, 7 | 15 | 33)
}

/// π electrons an atom donates to `ring`, or `None` if it cannot join a
/// conjugated system.
fn pi_electrons(mol: &Molecule, ring: &Ring, position: usize) -> Option<u32> {
    let id = ring.atoms[position];
    let atom = mol.atom(id);
    if !atom.element.is_sp2_capable() {
        return None;
    }

    let len = ring.atoms.len();
    let ring_neighbors = [ring.atoms[(position + len - 1) % len], ring.atoms[(position + 1) % len]];
    let mut ring_double = false;
    let mut ring_aromatic = false;
    let mut exo_double = false;
    let mut any_pi_bond = false;
    for (neighbor, bond) in mol.bonds_of(id) {
        let order = mol.bond(bond).order;
        let in_ring = ring_neighbors.contains(&neighbor);
        match order {
            BondOrder::Double if in_ring => ring_double = true,
            BondOrder::Double if !ring.contains(neighbor) => exo_double = true,
            BondOrder::Aromatic if in_ring => ring_aromatic = true,
            _ => {}
        }
        any_pi_bond |= matches!(order, BondOrder::Double | BondOrder::Aromatic);
    }
    let connections = mol.degree(id) + atom.hydrogens() as usize;
    let number = atom.element.atomic_number();

    match number {
        0 => Some(if any_pi_bond { 1 } else { 2 }),
        5 => Some(if ring_double || exo_double { 1 } else { 0 }),
        6 => match atom.charge {
            0 if any_pi_bond => Some(1),
            -1 => Some(2),
            1 => Some(0),
            _ => None,
        },
        _ => {
            if exo_double {
                Some(1)
            } else if atom.charge > 0 {
                (ring_double || ring_aromatic).then_some(1)
            } else if ring_double {
                Some(1)
            } else if atom.charge < 0 {
                Some(2)
            } else if ring_aromatic
                && is_pnictogen(number)
                && mol.heavy_degree(id) == 2
                && mol.total_hydrogens(id) == 0
            {
                // Pyridine-type position.
                Some(1)
            } else if is_pnictogen(number) {
                (connections <= 3).then_some(2)
            } else {
                (connections <= 2).then_some(2)
            }
        }
    }
}

/// Preconditions plus the Hückel test, against the molecule's current bond orders.
fn ring_is_aromatic(mol: &Molecule, ring: &Ring) -> bool {
    let orders: Vec<BondOrder> = ring.bonds.iter().map(|&b| mol.bond(b).order).collect();
    if orders.contains(&BondOrder::Triple) {
        return false;
    }
    let conjugated = orders
        .iter()
        .filter(|order| matches!(order, BondOrder::Double | BondOrder::Aromatic))
        .count();
    if conjugated < ring.size() / 2 {
        trace!("Ring {} has {conjugated} conjugated bonds, not aromatic", ring.id);
        return false;
    }

    let mut electrons = 0;
    for position in 0..ring.size() {
        match pi_electrons(mol, ring, position) {
            Some(count) => electrons += count,
            None => return false,
        }
    }
    trace!("Ring {} has {electrons} π electrons", ring.id);
    huckel(electrons)
}

/// Flags aromatic atoms and bonds in place.
///
/// Rings in the size window are tested repeatedly, in SSSR order, until no
/// new ring is accepted, so a ring may rely on the aromatic bonds of a fused
/// neighbour accepted before it.
///
/// # Arguments
///
/// * `mol` - The molecule; it is enriched first if needed.
/// * `options` - Ring window and ring-search limits.
///
/// # Returns
///
/// * `AromaticityReport` - What changed. Perception never fails; rings it
///   cannot classify stay non-aromatic.
#[instrument(skip_all, fields(atoms = mol.atom_count()))]
pub fn perceive_aromaticity(mol: &mut Molecule, options: &AromaticityOptions) -> AromaticityReport {
    ensure_enriched(mol);
    let original: Vec<BondOrder> = mol.bonds().map(|b| mol.bond(b).order).collect();
    let rings = find_rings(mol, &options.ring_limits);

    let mut accepted = vec![false; rings.len()];
    let mut claims = vec![0usize; mol.bond_count()];
    loop {
        let mut changed = false;
        for ring in rings.iter().filter(|ring| options.in_window(ring.size())) {
            if accepted[ring.id] || !ring_is_aromatic(mol, ring) {
                continue;
            }
            debug!("Ring {} ({} atoms) is aromatic", ring.id, ring.size());
            accepted[ring.id] = true;
            changed = true;
            let graph = mol.graph_mut();
            for &bond in &ring.bonds {
                claims[bond.index()] += 1;
                graph[bond].order = BondOrder::Aromatic;
            }
            for &atom in &ring.atoms {
                graph[atom].aromatic = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut in_accepted = vec![false; mol.atom_count()];
    for ring in rings.iter().filter(|ring| accepted[ring.id]) {
        for &atom in &ring.atoms {
            in_accepted[atom.index()] = true;
        }
    }

    // Atoms keeping a double bond out of the aromatic system drop out of it.
    let excluded: Vec<AtomId> = mol
        .atoms()
        .filter(|atom| in_accepted[atom.index()])
        .filter(|&atom| {
            mol.bonds_of(atom)
                .any(|(other, bond)| mol.bond(bond).order == BondOrder::Double && !in_accepted[other.index()])
        })
        .collect();
    for &atom in &excluded {
        let bonds: Vec<BondId> = mol.bonds_of(atom).map(|(_, bond)| bond).collect();
        let mut shared = false;
        for bond in bonds {
            match claims[bond.index()] {
                0 => {}
                1 => {
                    claims[bond.index()] = 0;
                    mol.graph_mut()[bond].order = original[bond.index()];
                }
                _ => shared = true,
            }
        }
        if !shared {
            mol.graph_mut()[atom].aromatic = false;
            in_accepted[atom.index()] = false;
        }
        debug!("Atom {} has an exocyclic double bond (shared: {shared})", atom.index());
    }

    let mut report = AromaticityReport {
        aromatic_rings: Vec::new(),
        aromatic_atoms: 0,
        excluded_atoms: excluded,
        dearomatized_bonds: 0,
        kekulize_failure: None,
        ring_status: rings.status,
    };

    let unclaimed: Vec<BondId> = mol
        .bonds()
        .filter(|b| claims[b.index()] == 0 && mol.bond(*b).order == BondOrder::Aromatic)
        .collect();
    if !unclaimed.is_empty() {
        match kekulize_bonds(mol, &unclaimed) {
            Ok(()) => report.dearomatized_bonds = unclaimed.len(),
            Err(error) => {
                warn!("Could not de-aromatize {} input aromatic bonds: {error}", unclaimed.len());
                report.kekulize_failure = Some(error);
            }
        }
    }

    // Aromatic input atoms with nothing aromatic left around them.
    for atom in mol.atoms().collect::<Vec<_>>() {
        let stray = mol.atom(atom).aromatic
            && !in_accepted[atom.index()]
            && !mol.bonds_of(atom).any(|(_, bond)| mol.bond(bond).order == BondOrder::Aromatic);
        if stray {
            mol.graph_mut()[atom].aromatic = false;
        }
    }

    let annotated = find_rings(mol, &options.ring_limits);
    assign_ring_ids(mol, &annotated);
    report.aromatic_rings = annotated.iter().filter(|ring| ring.aromatic).map(|ring| ring.id).collect();
    report.aromatic_atoms = mol.atoms().filter(|&atom| mol.atom(atom).aromatic).count();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_molecule;
    use petgraph::graph::NodeIndex;

    fn perceive(smiles: &str) -> (Molecule, AromaticityReport) {
        let mut mol = parse_molecule(smiles).expect("Failed to parse SMILES");
        let report = perceive_aromaticity(&mut mol, &AromaticityOptions::default());
        (mol, report)
    }

    fn aromatic_bonds(mol: &Molecule) -> usize {
        mol.bonds().filter(|&b| mol.bond(b).order == BondOrder::Aromatic).count()
    }

    #[test]
    fn test_huckel_rule() {
        assert!(huckel(2));
        assert!(huckel(6));
        assert!(huckel(10));
        assert!(!huckel(4));
        assert!(!huckel(8));
        assert!(!huckel(0));
    }

    #[test]
    fn test_benzene_both_forms() {
        for smiles in ["c1ccccc1", "C1=CC=CC=C1"] {
            let (mol, report) = perceive(smiles);
            assert_eq!(report.aromatic_atoms, 6, "{smiles}");
            assert_eq!(aromatic_bonds(&mol), 6, "{smiles}");
            assert_eq!(report.aromatic_rings, vec![0]);
        }
    }

    #[test]
    fn test_non_aromatic_rings() {
        assert_eq!(perceive("C1CCCCC1").1.aromatic_atoms, 0);
        assert_eq!(perceive("C1=CC=CC1").1.aromatic_atoms, 0);
        assert_eq!(perceive("O=C1C=CC(=O)C=C1").1.aromatic_atoms, 0);
    }

    #[test]
    fn test_heteroaromatics() {
        assert_eq!(perceive("C1=CC=CN1").1.aromatic_atoms, 5);
        assert_eq!(perceive("c1ccoc1").1.aromatic_atoms, 5);
        assert_eq!(perceive("c1ccsc1").1.aromatic_atoms, 5);
        assert_eq!(perceive("c1ccncc1").1.aromatic_atoms, 6);
        assert_eq!(perceive("c1c[nH]cn1").1.aromatic_atoms, 5);
        assert_eq!(perceive("C[n+]1ccccc1").1.aromatic_atoms, 6);
    }

    #[test]
    fn test_charged_carbocycles() {
        assert_eq!(perceive("[CH+]1C=CC=CC=C1").1.aromatic_atoms, 7);
        assert_eq!(perceive("[CH-]1C=CC=C1").1.aromatic_atoms, 5);
    }

    #[test]
    fn test_fused_kekule_rings_reach_fixed_point() {
        let (mol, report) = perceive("C1=CC=C2C=CC=CC2=C1");
        assert_eq!(report.aromatic_atoms, 10);
        assert_eq!(aromatic_bonds(&mol), 11);
        assert_eq!(report.aromatic_rings.len(), 2);
    }

    #[test]
    fn test_exocyclic_double_bond_excluded() {
        let (mol, report) = perceive("O=N1=CC=CC=C1");
        let nitrogen = NodeIndex::new(1);
        assert_eq!(report.excluded_atoms, vec![nitrogen]);
        assert!(!mol.atom(nitrogen).aromatic);
        assert_eq!(report.aromatic_atoms, 5);
        let reverted = mol.bond_between(nitrogen, NodeIndex::new(2)).expect("ring bond");
        assert_eq!(mol.bond(reverted).order, BondOrder::Double);
        assert!(report.aromatic_rings.is_empty());
    }

    #[test]
    fn test_large_input_ring_dearomatized() {
        let (mol, report) = perceive("c1ccccccc1");
        assert_eq!(report.aromatic_atoms, 0);
        assert_eq!(report.dearomatized_bonds, 8);
        let doubles = mol.bonds().filter(|&b| mol.bond(b).order == BondOrder::Double).count();
        assert_eq!(doubles, 4);
    }

    #[test]
    fn test_unkekulizable_input_keeps_flags() {
        let (_, report) = perceive("c1cccc1");
        assert!(report.kekulize_failure.is_some());
        assert_eq!(report.aromatic_atoms, 5);
    }

    #[test]
    fn test_ring_ids_assigned() {
        let (mol, _) = perceive("c1ccc2ccccc2c1");
        assert_eq!(mol.atom(NodeIndex::new(3)).rings.len(), 2);
        assert_eq!(mol.atom(NodeIndex::new(0)).rings.len(), 1);
    }
}

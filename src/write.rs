//! SMILES generation, in input order or canonical order.

use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;

use thiserror::Error;
use tracing::*;

use crate::canon::canonical_ranking;
use crate::enrich::{bare_hydrogens, ensure_enriched};
use crate::kekulize::{kekulize, KekulizeError};
use crate::molecule::*;

const MAX_RING_LABEL: u16 = 99;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Order atoms canonically instead of by atom id.
    pub canonical: bool,
    /// Write single/double bonds instead of aromatic atoms.
    pub kekule: bool,
    /// Bound on the canonical tie-break search.
    pub max_canon_leaves: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            canonical: false,
            kekule: false,
            max_canon_leaves: 256,
        }
    }
}

impl WriteOptions {
    pub fn canonical() -> Self {
        Self {
            canonical: true,
            ..Self::default()
        }
    }

    pub fn with_canonical(mut self, canonical: bool) -> Self {
        self.canonical = canonical;
        self
    }

    pub fn with_kekule(mut self, kekule: bool) -> Self {
        self.kekule = kekule;
        self
    }

    pub fn with_max_canon_leaves(mut self, leaves: usize) -> Self {
        self.max_canon_leaves = leaves;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("Cannot write Kekulé form: {0}")]
    Kekulize(#[from] KekulizeError),
    #[error("Ran out of ring-closure labels at atom {0}")]
    RingLabelsExhausted(usize),
}

/// Can this atom be written with a lowercase symbol?
fn written_aromatic(atom: &Atom) -> bool {
    atom.aromatic && atom.element.can_be_aromatic() && !atom.element.is_wildcard()
}

fn needs_bracket(mol: &Molecule, id: AtomId) -> bool {
    let atom = mol.atom(id);
    if atom.isotope.is_some() || atom.charge != 0 || atom.class.is_some() || atom.chirality.is_some() {
        return true;
    }
    if !atom.element.is_organic_subset() {
        return true;
    }
    atom.hydrogens() != bare_hydrogens(mol, id)
}

fn charge_text(charge: i8) -> String {
    match charge {
        0 => String::new(),
        1 => "+".to_string(),
        -1 => "-".to_string(),
        c if c > 0 => format!("+{c}"),
        c => format!("-{}", c.unsigned_abs()),
    }
}

fn ring_label_text(label: u16) -> String {
    if label < 10 {
        label.to_string()
    } else {
        format!("%{label:02}")
    }
}

/// Directional bonds that describe one double-bond geometry, keyed by the
/// representative bond of their system. Marks of a system flip together.
fn direction_systems(mol: &Molecule) -> Vec<usize> {
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut parent: Vec<usize> = (0..mol.bond_count()).collect();
    for bond in mol.bonds() {
        if mol.bond(bond).order != BondOrder::Double {
            continue;
        }
        if let Some((a, b)) = mol.bond_endpoints(bond) {
            let marked: Vec<usize> = mol
                .bonds_of(a)
                .chain(mol.bonds_of(b))
                .filter(|&(_, other)| mol.bond(other).stereo.is_some())
                .map(|(_, other)| other.index())
                .collect();
            for pair in marked.windows(2) {
                let (x, y) = (root(&mut parent, pair[0]), root(&mut parent, pair[1]));
                parent[x] = y;
            }
        }
    }
    (0..parent.len()).map(|i| root(&mut parent, i)).collect()
}

/// Writes one fixed atom order. Lower rank is written first.
struct SmilesWriter<'a> {
    mol: &'a Molecule,
    ranks: &'a [usize],
    /// Flip each direction system so its first written mark is `/`.
    normalize_directions: bool,
    direction_systems: Vec<usize>,
    direction_flips: BTreeMap<usize, bool>,
    preorder: Vec<Option<usize>>,
    handled: Vec<bool>,
    children: Vec<Vec<(AtomId, BondId)>>,
    ring_opens: Vec<Vec<BondId>>,
    ring_closes: Vec<Vec<BondId>>,
    labels: BTreeMap<BondId, u16>,
    in_use: Vec<bool>,
    out: String,
}

impl<'a> SmilesWriter<'a> {
    fn new(mol: &'a Molecule, ranks: &'a [usize], normalize_directions: bool) -> Self {
        let n = mol.atom_count();
        Self {
            mol,
            ranks,
            normalize_directions,
            direction_systems: direction_systems(mol),
            direction_flips: BTreeMap::new(),
            preorder: vec![None; n],
            handled: vec![false; mol.bond_count()],
            children: vec![Vec::new(); n],
            ring_opens: vec![Vec::new(); n],
            ring_closes: vec![Vec::new(); n],
            labels: BTreeMap::new(),
            in_use: vec![false; MAX_RING_LABEL as usize + 1],
            out: String::new(),
        }
    }

    fn other(&self, bond: BondId, atom: AtomId) -> AtomId {
        match self.mol.bond_endpoints(bond) {
            Some((a, b)) if a == atom => b,
            Some((a, _)) => a,
            None => atom,
        }
    }

    /// Lays out the spanning tree and the ring bonds of one component.
    fn visit(&mut self, atom: AtomId, counter: &mut usize) {
        self.preorder[atom.index()] = Some(*counter);
        *counter += 1;
        let mut bonds: Vec<(AtomId, BondId)> = self.mol.bonds_of(atom).collect();
        bonds.sort_by_key(|&(next, _)| self.ranks[next.index()]);
        for (next, bond) in bonds {
            if self.handled[bond.index()] {
                continue;
            }
            self.handled[bond.index()] = true;
            match self.preorder[next.index()] {
                // An unhandled bond to a visited atom leads back to an
                // ancestor, so the ring bond opens there.
                Some(_) => {
                    self.ring_opens[next.index()].push(bond);
                    self.ring_closes[atom.index()].push(bond);
                }
                None => {
                    self.children[atom.index()].push((next, bond));
                    self.visit(next, counter);
                }
            }
        }
    }

    fn direction_text(&mut self, bond: BondId, stereo: BondStereo, from: AtomId) -> String {
        let direction = stereo.direction_from(from);
        if !self.normalize_directions {
            return direction.symbol().to_string();
        }
        let system = self.direction_systems[bond.index()];
        let flip = *self
            .direction_flips
            .entry(system)
            .or_insert(direction == Direction::Down);
        if flip {
            direction.flipped().symbol().to_string()
        } else {
            direction.symbol().to_string()
        }
    }

    fn bond_text(&mut self, bond: BondId, from: AtomId, to: AtomId) -> String {
        let mol = self.mol;
        let data = mol.bond(bond);
        let both_aromatic = written_aromatic(mol.atom(from)) && written_aromatic(mol.atom(to));
        match data.order {
            BondOrder::Aromatic if both_aromatic => String::new(),
            BondOrder::Aromatic => ":".to_string(),
            BondOrder::Single => match data.stereo {
                Some(stereo) => self.direction_text(bond, stereo, from),
                None if both_aromatic => "-".to_string(),
                None => String::new(),
            },
            order => order.symbol().to_string(),
        }
    }

    fn atom_text(&self, id: AtomId, order: &[Option<AtomId>]) -> String {
        let atom = self.mol.atom(id);
        let symbol = if written_aromatic(atom) {
            atom.element.aromatic_symbol()
        } else {
            atom.element.symbol().to_string()
        };
        if !needs_bracket(self.mol, id) {
            return symbol;
        }

        let mut text = String::from("[");
        if let Some(isotope) = atom.isotope {
            let _ = write!(text, "{isotope}");
        }
        text.push_str(&symbol);
        if let Some(chirality) = &atom.chirality {
            match chirality.class_for_order(order) {
                Some(class) => text.push_str(class.symbol()),
                None => debug!("Dropping chirality of atom {}: neighbours changed", id.index()),
            }
        }
        match atom.hydrogens() {
            0 => {}
            1 => text.push('H'),
            h => {
                let _ = write!(text, "H{h}");
            }
        }
        text.push_str(&charge_text(atom.charge));
        if let Some(class) = atom.class {
            let _ = write!(text, ":{class}");
        }
        text.push(']');
        text
    }

    fn emit(&mut self, atom: AtomId, parent: Option<(AtomId, BondId)>) -> Result<(), WriteError> {
        let mut order: Vec<Option<AtomId>> = Vec::new();
        if let Some((from, bond)) = parent {
            let symbol = self.bond_text(bond, from, atom);
            self.out.push_str(&symbol);
            order.push(Some(from));
        }
        if needs_bracket(self.mol, atom) && self.mol.atom(atom).hydrogens() > 0 {
            order.push(None);
        }

        let mut rings = String::new();
        for bond in self.ring_closes[atom.index()].clone() {
            if let Some(label) = self.labels.remove(&bond) {
                self.in_use[label as usize] = false;
                rings.push_str(&ring_label_text(label));
            }
            order.push(Some(self.other(bond, atom)));
        }
        for bond in self.ring_opens[atom.index()].clone() {
            let label = (1..=MAX_RING_LABEL)
                .find(|&label| !self.in_use[label as usize])
                .ok_or(WriteError::RingLabelsExhausted(atom.index()))?;
            self.in_use[label as usize] = true;
            self.labels.insert(bond, label);
            let partner = self.other(bond, atom);
            rings.push_str(&self.bond_text(bond, atom, partner));
            rings.push_str(&ring_label_text(label));
            order.push(Some(partner));
        }
        let children = self.children[atom.index()].clone();
        order.extend(children.iter().map(|&(child, _)| Some(child)));

        let text = self.atom_text(atom, &order);
        self.out.push_str(&text);
        self.out.push_str(&rings);

        for (index, &(child, bond)) in children.iter().enumerate() {
            let branch = index + 1 < children.len();
            if branch {
                self.out.push('(');
            }
            self.emit(child, Some((atom, bond)))?;
            if branch {
                self.out.push(')');
            }
        }
        Ok(())
    }

    fn write(mut self) -> Result<String, WriteError> {
        let mut atoms: Vec<AtomId> = self.mol.atoms().collect();
        atoms.sort_by_key(|atom| self.ranks[atom.index()]);
        let mut counter = 0;
        let mut first = true;
        for root in atoms {
            if self.preorder[root.index()].is_some() {
                continue;
            }
            self.visit(root, &mut counter);
            if !first {
                self.out.push('.');
            }
            first = false;
            self.emit(root, None)?;
        }
        Ok(self.out)
    }
}

/// Writes `mol` with atoms ordered by `ranks`. With `normalize_directions`
/// the `/` and `\` marks of each double-bond system are flipped together so
/// the first one written is `/`.
pub(crate) fn write_ranked(mol: &Molecule, ranks: &[usize], normalize_directions: bool) -> Result<String, WriteError> {
    SmilesWriter::new(mol, ranks, normalize_directions).write()
}

/// Writes a molecule as SMILES.
///
/// # Arguments
///
/// * `mol` - The molecule to write. It is not modified.
/// * `options` - Canonical or input order, aromatic or Kekulé form.
///
/// # Returns
///
/// * `Result<String, WriteError>` - The SMILES string (empty for an empty
///   molecule), or why it could not be written.
#[instrument(skip_all, fields(atoms = mol.atom_count(), canonical = options.canonical))]
pub fn generate(mol: &Molecule, options: &WriteOptions) -> Result<String, WriteError> {
    let mut copy = mol.clone();
    ensure_enriched(&mut copy);
    if options.kekule {
        kekulize(&mut copy)?;
    }
    if options.canonical {
        let ranking = canonical_ranking(&copy, options.max_canon_leaves, |ranks| write_ranked(&copy, ranks, true))?;
        trace!("Canonical search rendered {} leaves", ranking.leaves);
        return Ok(ranking.text);
    }
    let ranks: Vec<usize> = (0..copy.atom_count()).collect();
    write_ranked(&copy, &ranks, false)
}

impl Molecule {
    pub fn to_smiles(&self) -> Result<String, WriteError> {
        generate(self, &WriteOptions::default())
    }

    pub fn to_canonical_smiles(&self) -> Result<String, WriteError> {
        generate(self, &WriteOptions::canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aromaticity::{perceive_aromaticity, AromaticityOptions};
    use crate::parse::parse_molecule;

    fn written(smiles: &str, options: &WriteOptions) -> String {
        let mol = parse_molecule(smiles).expect("Failed to parse SMILES");
        generate(&mol, options).expect("Failed to write SMILES")
    }

    fn canonical(smiles: &str) -> String {
        let mut mol = parse_molecule(smiles).expect("Failed to parse SMILES");
        perceive_aromaticity(&mut mol, &AromaticityOptions::default());
        generate(&mol, &WriteOptions::canonical()).expect("Failed to write SMILES")
    }

    #[test]
    fn test_input_order_round_trip() {
        for smiles in ["CCO", "CC(=O)O", "C1CC1", "c1ccccc1", "C#N", "F/C=C/F", "[13CH4]", "[NH4+]", "c1cc[nH]c1"] {
            assert_eq!(written(smiles, &WriteOptions::default()), smiles);
        }
    }

    #[test]
    fn test_branches_and_rings() {
        assert_eq!(written("CC(C)(C)C", &WriteOptions::default()), "CC(C)(C)C");
        assert_eq!(written("C1CC2CCC1C2", &WriteOptions::default()), "C1CC2CCC1C2");
        assert_eq!(written("[Na+].[Cl-]", &WriteOptions::default()), "[Na+].[Cl-]");
    }

    #[test]
    fn test_aromatic_single_bond_written() {
        assert_eq!(written("c1ccccc1-c1ccccc1", &WriteOptions::default()), "c1ccccc1-c1ccccc1");
    }

    #[test]
    fn test_kekule_form() {
        assert_eq!(written("c1ccccc1", &WriteOptions::default().with_kekule(true)).matches('=').count(), 3);
        assert_eq!(written("c1cc[nH]c1", &WriteOptions::default().with_kekule(true)).matches('=').count(), 2);
        let mol = parse_molecule("c1cccc1").expect("Failed to parse SMILES");
        assert!(matches!(
            generate(&mol, &WriteOptions::default().with_kekule(true)),
            Err(WriteError::Kekulize(_))
        ));
    }

    #[test]
    fn test_canonical_stability() {
        assert_eq!(canonical("CCO"), canonical("OCC"));
        assert_eq!(canonical("CCO"), "CCO");
        assert_eq!(canonical("c1ccccc1"), canonical("C1=CC=CC=C1"));
        assert_eq!(canonical("OC(=O)C"), canonical("CC(O)=O"));
        assert_eq!(canonical("c1ccncc1"), canonical("n1ccccc1"));
        assert_eq!(canonical("C1CC1CC1CCC1"), canonical("C1CCC1CC1CC1"));
    }

    #[test]
    fn test_chirality_preserved_through_reordering() {
        // Both strings describe the same enantiomer.
        assert_eq!(canonical("N[C@@H](C)C(=O)O"), canonical("C[C@H](N)C(=O)O"));
        assert_ne!(canonical("N[C@@H](C)C(=O)O"), canonical("N[C@H](C)C(=O)O"));
    }

    #[test]
    fn test_double_bond_geometry_is_canonical() {
        let cis = canonical("F/C=C\\F");
        assert_eq!(cis, canonical("F\\C=C/F"));
        assert_eq!(cis, canonical("C(/F)=C/F"));
        let trans = canonical("F/C=C/F");
        assert_eq!(trans, canonical("F\\C=C\\F"));
        assert_ne!(cis, trans);
        let first_mark = cis.chars().find(|&c| c == '/' || c == '\\');
        assert_eq!(first_mark, Some('/'));
        // Input order keeps the marks as written.
        assert_eq!(written("F\\C=C/F", &WriteOptions::default()), "F\\C=C/F");
    }

    #[test]
    fn test_ring_labels() {
        assert_eq!(ring_label_text(3), "3");
        assert_eq!(ring_label_text(12), "%12");
        assert_eq!(written("C1CC1C1CC1", &WriteOptions::default()), "C1CC1C1CC1");
    }

    #[test]
    fn test_empty_molecule() {
        assert_eq!(generate(&Molecule::new(), &WriteOptions::default()), Ok(String::new()));
    }
}

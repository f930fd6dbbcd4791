//! Structural query patterns (a SMARTS subset): predicate trees, the
//! compiler, and the backtracking matcher.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::element::Element;
use crate::enrich::total_valence;
use crate::molecule::*;

mod compile;
pub use compile::*;

mod matcher;
pub use matcher::*;

/// A single test on a molecule atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomPrimitive {
    /// `*`
    Any,
    /// `a`
    Aromatic,
    /// `A`
    Aliphatic,
    /// `C`, `c` or `#6`. `aromatic` is `None` for `#n`.
    Element {
        element: Element,
        aromatic: Option<bool>,
    },
    Isotope(u16),
    /// `D<n>`: explicit connections.
    Degree(u8),
    /// `X<n>`: connections including hydrogens.
    Connectivity(u8),
    /// `H<n>`: total hydrogens.
    TotalHydrogens(u8),
    /// `h<n>`: hydrogens carried on the atom. `None` means at least one.
    ImplicitHydrogens(Option<u8>),
    /// `R<n>`: number of SSSR rings. `None` means in any ring.
    RingCount(Option<u8>),
    /// `r<n>`: member of a ring of that size. `None` means in any ring.
    RingSize(Option<u8>),
    /// `x<n>`: number of ring bonds. `None` means at least one.
    RingConnectivity(Option<u8>),
    /// `v<n>`: total bond order including hydrogens.
    Valence(u8),
    Charge(i8),
    /// `@`/`@@`. Recorded but not checked.
    Chirality(ChiralClass),
    /// `:n`. Recorded but not checked.
    Class(u16),
}

/// Logical combination of atom primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomExpr {
    Primitive(AtomPrimitive),
    Not(Box<AtomExpr>),
    And(Vec<AtomExpr>),
    Or(Vec<AtomExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondPrimitive {
    Single,
    Double,
    Triple,
    Aromatic,
    /// `~`
    Any,
    /// `@`
    Ring,
    /// `/`, matched as a single bond.
    Up,
    /// `\`, matched as a single bond.
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BondExpr {
    Primitive(BondPrimitive),
    Not(Box<BondExpr>),
    And(Vec<BondExpr>),
    Or(Vec<BondExpr>),
}

/// Everything a predicate may ask about a molecule atom.
pub struct TargetAtom<'a> {
    pub mol: &'a Molecule,
    pub id: AtomId,
    pub ring_count: usize,
    pub ring_sizes: &'a [usize],
    pub ring_bonds: usize,
}

impl AtomPrimitive {
    pub fn matches(&self, target: &TargetAtom) -> bool {
        let mol = target.mol;
        let atom = mol.atom(target.id);
        match self {
            AtomPrimitive::Any | AtomPrimitive::Chirality(_) | AtomPrimitive::Class(_) => true,
            AtomPrimitive::Aromatic => atom.aromatic,
            AtomPrimitive::Aliphatic => !atom.aromatic,
            AtomPrimitive::Element { element, aromatic } => {
                atom.element == *element && aromatic.map_or(true, |a| a == atom.aromatic)
            }
            AtomPrimitive::Isotope(isotope) => atom.isotope == Some(*isotope),
            AtomPrimitive::Degree(n) => mol.degree(target.id) == *n as usize,
            AtomPrimitive::Connectivity(n) => mol.degree(target.id) + atom.hydrogens() as usize == *n as usize,
            AtomPrimitive::TotalHydrogens(n) => mol.total_hydrogens(target.id) == *n as usize,
            AtomPrimitive::ImplicitHydrogens(None) => atom.hydrogens() > 0,
            AtomPrimitive::ImplicitHydrogens(Some(n)) => atom.hydrogens() == *n,
            AtomPrimitive::RingCount(None) => atom.in_ring,
            AtomPrimitive::RingCount(Some(n)) => target.ring_count == *n as usize,
            AtomPrimitive::RingSize(None) => atom.in_ring,
            AtomPrimitive::RingSize(Some(n)) => target.ring_sizes.contains(&(*n as usize)),
            AtomPrimitive::RingConnectivity(None) => target.ring_bonds > 0,
            AtomPrimitive::RingConnectivity(Some(n)) => target.ring_bonds == *n as usize,
            AtomPrimitive::Valence(n) => total_valence(mol, target.id) == *n as usize,
            AtomPrimitive::Charge(charge) => atom.charge == *charge,
        }
    }
}

impl AtomExpr {
    pub fn primitive(primitive: AtomPrimitive) -> Self {
        AtomExpr::Primitive(primitive)
    }

    /// Conjunction, collapsed when there is a single term.
    pub fn and(mut terms: Vec<AtomExpr>) -> Self {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            AtomExpr::And(terms)
        }
    }

    pub fn or(mut terms: Vec<AtomExpr>) -> Self {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            AtomExpr::Or(terms)
        }
    }

    pub fn matches(&self, target: &TargetAtom) -> bool {
        match self {
            AtomExpr::Primitive(primitive) => primitive.matches(target),
            AtomExpr::Not(inner) => !inner.matches(target),
            AtomExpr::And(terms) => terms.iter().all(|term| term.matches(target)),
            AtomExpr::Or(terms) => terms.iter().any(|term| term.matches(target)),
        }
    }
}

impl BondPrimitive {
    pub fn matches(&self, bond: &Bond) -> bool {
        match self {
            BondPrimitive::Single | BondPrimitive::Up | BondPrimitive::Down => bond.order == BondOrder::Single,
            BondPrimitive::Double => bond.order == BondOrder::Double,
            BondPrimitive::Triple => bond.order == BondOrder::Triple,
            BondPrimitive::Aromatic => bond.order == BondOrder::Aromatic,
            BondPrimitive::Any => true,
            BondPrimitive::Ring => bond.in_ring,
        }
    }
}

impl BondExpr {
    /// The bond between two pattern atoms written next to each other.
    pub fn implicit() -> Self {
        BondExpr::Or(vec![
            BondExpr::Primitive(BondPrimitive::Single),
            BondExpr::Primitive(BondPrimitive::Aromatic),
        ])
    }

    pub fn and(mut terms: Vec<BondExpr>) -> Self {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            BondExpr::And(terms)
        }
    }

    pub fn or(mut terms: Vec<BondExpr>) -> Self {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            BondExpr::Or(terms)
        }
    }

    pub fn matches(&self, bond: &Bond) -> bool {
        match self {
            BondExpr::Primitive(primitive) => primitive.matches(bond),
            BondExpr::Not(inner) => !inner.matches(bond),
            BondExpr::And(terms) => terms.iter().all(|term| term.matches(bond)),
            BondExpr::Or(terms) => terms.iter().any(|term| term.matches(bond)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternAtom {
    pub expr: AtomExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternBond {
    pub begin: usize,
    pub end: usize,
    pub expr: BondExpr,
    /// Written as a ring-closure digit.
    pub ring_closure: bool,
}

impl PatternBond {
    pub fn other(&self, atom: usize) -> usize {
        if atom == self.begin {
            self.end
        } else {
            self.begin
        }
    }
}

/// A compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub atoms: Vec<PatternAtom>,
    pub bonds: Vec<PatternBond>,
    text: String,
}

impl Pattern {
    pub(crate) fn new(text: &str, atoms: Vec<PatternAtom>, bonds: Vec<PatternBond>) -> Self {
        Self {
            atoms,
            bonds,
            text: text.to_string(),
        }
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// `(neighbour, bond index)` pairs in the order the bonds were written.
    pub fn neighbors(&self, atom: usize) -> Vec<(usize, usize)> {
        self.bonds
            .iter()
            .enumerate()
            .filter(|(_, bond)| bond.begin == atom || bond.end == atom)
            .map(|(index, bond)| (bond.other(atom), index))
            .collect()
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.text)
    }
}

impl std::str::FromStr for Pattern {
    type Err = PatternErrors;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        compile_pattern(text)
    }
}

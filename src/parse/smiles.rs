use std::collections::BTreeMap;

use thiserror::Error;
use tracing::*;

use super::bracket::parse_bracket_atom;
use crate::element::Element;
use crate::molecule::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmilesError {
    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),
    #[error("Branch start '(' at position {0} (followed by {1}) without a current atom")]
    BranchNoCurrentAtom(usize, String),
    #[error("Branch end ')' at position {0} (followed by {1}) without a matching '('")]
    BranchEndNoStart(usize, String),
    #[error("Branch opened at position {0} is never closed")]
    UnclosedBranch(usize),
    #[error("Empty branch '()' at position {0}")]
    EmptyBranch(usize),
    #[error("Ring closure {0} at position {1} without a current atom")]
    RingClosureNoCurrentAtom(u16, usize),
    #[error("Ring closure {0} opened at position {1} is never closed")]
    UnclosedRing(u16, usize),
    #[error("Ring closure {0} at position {1} has conflicting bond symbols")]
    ConflictingRingBond(u16, usize),
    #[error("Ring closure {0} at position {1} bonds an atom to itself")]
    SelfRingClosure(u16, usize),
    #[error("Bond at position {0} duplicates the existing bond between atoms {1} and {2}")]
    DuplicateBond(usize, usize, usize),
    #[error("Ring closure label after '%' at position {0} must be two digits")]
    InvalidRingLabel(usize),
    #[error("Unclosed bracket '[' at position {0}")]
    UnclosedBracket(usize),
    #[error("Invalid bracket atom '[{0}]' at position {1}")]
    InvalidBracketAtom(String, usize),
    #[error("Unknown element '{0}' at position {1}")]
    UnknownElement(String, usize),
    #[error("Bond '{0}' at position {1} is not followed by an atom")]
    DanglingBond(char, usize),
    #[error("Bond '{0}' at position {1} does not follow an atom")]
    BondWithoutAtom(char, usize),
    #[error("Empty SMILES string")]
    EmptyInput,
}

fn join_errors<E: ToString>(errors: &[E]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Every error found while scanning a SMILES string. Never empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", join_errors(.0))]
pub struct SmilesErrors(pub Vec<SmilesError>);

impl SmilesErrors {
    pub fn errors(&self) -> &[SmilesError] {
        &self.0
    }

    pub fn first(&self) -> Option<&SmilesError> {
        self.0.first()
    }
}

/// A bond symbol waiting for the atom (or ring closure) it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BondSymbol {
    Order(BondOrder),
    Directional(Direction),
}

impl BondSymbol {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '-' => BondSymbol::Order(BondOrder::Single),
            '=' => BondSymbol::Order(BondOrder::Double),
            '#' => BondSymbol::Order(BondOrder::Triple),
            ':' => BondSymbol::Order(BondOrder::Aromatic),
            '/' => BondSymbol::Directional(Direction::Up),
            '\\' => BondSymbol::Directional(Direction::Down),
            _ => return None,
        })
    }

    fn character(&self) -> char {
        match self {
            BondSymbol::Order(order) => order.symbol(),
            BondSymbol::Directional(direction) => direction.symbol(),
        }
    }
}

/// Entries of an atom's neighbour list, in the order they were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Atom(AtomId),
    Hydrogen,
    Ring(u16),
}

struct RingOpening {
    atom: AtomId,
    bond: Option<BondSymbol>,
    position: usize,
}

struct Branch {
    atom: AtomId,
    position: usize,
    atoms_before: usize,
}

struct SmilesParser<'a> {
    smiles: &'a str,
    chars: Vec<char>,
    graph: MoleculeGraph,
    current_atom: Option<AtomId>,
    pending_bond: Option<(BondSymbol, usize)>,
    branch_stack: Vec<Branch>,
    ring_map: BTreeMap<u16, RingOpening>,
    neighbor_order: Vec<Vec<Slot>>,
    errors: Vec<SmilesError>,
}

impl<'a> SmilesParser<'a> {
    fn new(smiles: &'a str) -> Self {
        Self {
            smiles,
            chars: smiles.chars().collect(),
            graph: MoleculeGraph::default(),
            current_atom: None,
            pending_bond: None,
            branch_stack: Vec::new(),
            ring_map: BTreeMap::new(),
            neighbor_order: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn rest(&self, i: usize) -> String {
        self.chars[i..].iter().collect()
    }

    fn bond_for(&self, symbol: Option<BondSymbol>, from: AtomId, to: AtomId) -> Bond {
        match symbol {
            Some(BondSymbol::Order(order)) => Bond::new(order),
            Some(BondSymbol::Directional(direction)) => Bond {
                stereo: Some(BondStereo { direction, from }),
                ..Bond::new(BondOrder::Single)
            },
            None if self.graph[from].aromatic && self.graph[to].aromatic => Bond::new(BondOrder::Aromatic),
            None => Bond::new(BondOrder::Single),
        }
    }

    /// Add an atom, bonding it to the current atom with any pending bond.
    fn add_atom(&mut self, atom: Atom) {
        let hydrogens = atom.explicit_hydrogens.unwrap_or(0);
        let node = self.graph.add_node(atom);
        self.neighbor_order.push(Vec::new());

        if let Some(previous) = self.current_atom {
            let symbol = self.pending_bond.take().map(|(symbol, _)| symbol);
            let bond = self.bond_for(symbol, previous, node);
            self.graph.add_edge(previous, node, bond);
            self.neighbor_order[previous.index()].push(Slot::Atom(node));
            self.neighbor_order[node.index()].push(Slot::Atom(previous));
        }
        if hydrogens > 0 {
            self.neighbor_order[node.index()].push(Slot::Hydrogen);
        }
        self.current_atom = Some(node);
    }

    fn ring_closure(&mut self, label: u16, position: usize) {
        let current = match self.current_atom {
            Some(atom) => atom,
            None => {
                self.errors.push(SmilesError::RingClosureNoCurrentAtom(label, position));
                self.pending_bond = None;
                return;
            }
        };
        let closing_bond = self.pending_bond.take().map(|(symbol, _)| symbol);

        let opening = match self.ring_map.remove(&label) {
            Some(opening) => opening,
            None => {
                self.ring_map.insert(
                    label,
                    RingOpening {
                        atom: current,
                        bond: closing_bond,
                        position,
                    },
                );
                self.neighbor_order[current.index()].push(Slot::Ring(label));
                return;
            }
        };

        if opening.atom == current {
            self.errors.push(SmilesError::SelfRingClosure(label, position));
            return;
        }
        if self.graph.find_edge(opening.atom, current).is_some() {
            self.errors.push(SmilesError::DuplicateBond(
                position,
                opening.atom.index(),
                current.index(),
            ));
            return;
        }

        let bond = match (opening.bond, closing_bond) {
            (Some(BondSymbol::Order(a)), Some(BondSymbol::Order(b))) if a != b => {
                self.errors.push(SmilesError::ConflictingRingBond(label, position));
                return;
            }
            (Some(BondSymbol::Directional(_)), Some(BondSymbol::Order(_)))
            | (Some(BondSymbol::Order(_)), Some(BondSymbol::Directional(_))) => {
                self.errors.push(SmilesError::ConflictingRingBond(label, position));
                return;
            }
            // A directional marker is read from the atom it is written next to.
            (Some(symbol), _) => self.bond_for(Some(symbol), opening.atom, current),
            (None, Some(symbol)) => self.bond_for(Some(symbol), current, opening.atom),
            (None, None) => self.bond_for(None, opening.atom, current),
        };
        self.graph.add_edge(opening.atom, current, bond);

        if let Some(slot) = self.neighbor_order[opening.atom.index()]
            .iter_mut()
            .find(|slot| **slot == Slot::Ring(label))
        {
            *slot = Slot::Atom(current);
        }
        self.neighbor_order[current.index()].push(Slot::Atom(opening.atom));
    }

    fn bracket_atom(&mut self, i: usize) -> usize {
        let close = match self.chars[i + 1..].iter().position(|&c| c == ']') {
            Some(offset) => i + 1 + offset,
            None => {
                self.errors.push(SmilesError::UnclosedBracket(i));
                return self.chars.len();
            }
        };
        let content: String = self.chars[i + 1..close].iter().collect();
        match parse_bracket_atom(&content) {
            Some(parsed) => {
                let atom = Atom {
                    element: parsed.element,
                    aromatic: parsed.aromatic,
                    isotope: parsed.isotope,
                    charge: parsed.charge,
                    explicit_hydrogens: Some(parsed.hydrogens),
                    chirality: parsed.chirality.map(|class| Chirality {
                        class,
                        reference: Vec::new(),
                    }),
                    class: parsed.class,
                    ..Atom::new(parsed.element)
                };
                self.add_atom(atom);
            }
            None => {
                trace!("Rejected bracket atom [{content}]");
                self.errors.push(SmilesError::InvalidBracketAtom(content, i));
                self.pending_bond = None;
            }
        }
        close + 1
    }

    /// Bare organic-subset atoms, returning the index after the symbol.
    fn bare_atom(&mut self, i: usize) -> usize {
        let c = self.chars[i];
        let next = self.chars.get(i + 1).copied();
        let (atom, width) = match (c, next) {
            ('C', Some('l')) => (Atom::new(Element::Cl), 2),
            ('B', Some('r')) => (Atom::new(Element::Br), 2),
            ('*', _) => (Atom::new(Element::WILDCARD), 1),
            (c, _) if c.is_ascii_uppercase() => {
                match Element::from_symbol(&c.to_string()).filter(|e| e.is_organic_subset()) {
                    Some(element) => (Atom::new(element), 1),
                    None => {
                        self.errors.push(SmilesError::UnknownElement(c.to_string(), i));
                        self.pending_bond = None;
                        return i + 1;
                    }
                }
            }
            (c, _) => match Element::from_aromatic_symbol(&c.to_string()) {
                Some(element) => (Atom::aromatic(element), 1),
                None => {
                    self.errors.push(SmilesError::UnexpectedCharacter(c, i));
                    return i + 1;
                }
            },
        };
        self.add_atom(atom);
        i + width
    }

    fn run(&mut self) {
        let mut i = 0;
        while i < self.chars.len() {
            let c = self.chars[i];
            match c {
                '(' => {
                    // Start of a branch: push current_atom to stack
                    if let Some((symbol, position)) = self.pending_bond.take() {
                        self.errors.push(SmilesError::DanglingBond(symbol.character(), position));
                    }
                    match self.current_atom {
                        Some(atom) => self.branch_stack.push(Branch {
                            atom,
                            position: i,
                            atoms_before: self.graph.node_count(),
                        }),
                        None => {
                            let rest = self.rest(i);
                            self.errors.push(SmilesError::BranchNoCurrentAtom(i, rest));
                        }
                    }
                    i += 1;
                }
                ')' => {
                    // End of a branch: return to the atom the branch hangs off
                    if let Some((symbol, position)) = self.pending_bond.take() {
                        self.errors.push(SmilesError::DanglingBond(symbol.character(), position));
                    }
                    match self.branch_stack.pop() {
                        Some(branch) => {
                            if branch.atoms_before == self.graph.node_count() {
                                self.errors.push(SmilesError::EmptyBranch(branch.position));
                            }
                            self.current_atom = Some(branch.atom);
                        }
                        None => {
                            let rest = self.rest(i);
                            self.errors.push(SmilesError::BranchEndNoStart(i, rest));
                        }
                    }
                    i += 1;
                }
                '.' => {
                    if let Some((symbol, position)) = self.pending_bond.take() {
                        self.errors.push(SmilesError::DanglingBond(symbol.character(), position));
                    }
                    self.current_atom = None;
                    i += 1;
                }
                '-' | '=' | '#' | ':' | '/' | '\\' => {
                    if self.current_atom.is_none() {
                        self.errors.push(SmilesError::BondWithoutAtom(c, i));
                    } else if self.pending_bond.is_some() {
                        self.errors.push(SmilesError::UnexpectedCharacter(c, i));
                    } else if let Some(symbol) = BondSymbol::from_char(c) {
                        self.pending_bond = Some((symbol, i));
                    }
                    i += 1;
                }
                '%' => {
                    let digits: Option<u16> = match (self.chars.get(i + 1), self.chars.get(i + 2)) {
                        (Some(a), Some(b)) => match (a.to_digit(10), b.to_digit(10)) {
                            (Some(a), Some(b)) => Some((a * 10 + b) as u16),
                            _ => None,
                        },
                        _ => None,
                    };
                    match digits {
                        Some(label) => {
                            self.ring_closure(label, i);
                            i += 3;
                        }
                        None => {
                            self.errors.push(SmilesError::InvalidRingLabel(i));
                            i += 1;
                        }
                    }
                }
                '0'..='9' => {
                    let label = c.to_digit(10).unwrap_or(0) as u16;
                    self.ring_closure(label, i);
                    i += 1;
                }
                '[' => {
                    i = self.bracket_atom(i);
                }
                c if c.is_ascii_alphabetic() || c == '*' => {
                    i = self.bare_atom(i);
                }
                c => {
                    self.errors.push(SmilesError::UnexpectedCharacter(c, i));
                    i += 1;
                }
            }
        }

        if let Some((symbol, position)) = self.pending_bond.take() {
            self.errors.push(SmilesError::DanglingBond(symbol.character(), position));
        }
        for branch in &self.branch_stack {
            self.errors.push(SmilesError::UnclosedBranch(branch.position));
        }
        for (label, opening) in &self.ring_map {
            self.errors.push(SmilesError::UnclosedRing(*label, opening.position));
        }
    }

    /// Turn the recorded neighbour order into chirality references.
    fn resolve_chirality(&mut self) {
        for node in self.graph.node_indices().collect::<Vec<_>>() {
            let order: Vec<Option<AtomId>> = self.neighbor_order[node.index()]
                .iter()
                .filter_map(|slot| match slot {
                    Slot::Atom(atom) => Some(Some(*atom)),
                    Slot::Hydrogen => Some(None),
                    Slot::Ring(_) => None,
                })
                .collect();
            if let Some(chirality) = self.graph[node].chirality.as_mut() {
                chirality.reference = order;
            }
        }
    }

    fn finish(mut self) -> Result<Molecule, SmilesErrors> {
        if !self.errors.is_empty() {
            debug!("Failed to parse {}: {} error(s)", self.smiles, self.errors.len());
            return Err(SmilesErrors(self.errors));
        }
        self.resolve_chirality();
        Ok(Molecule::from_graph(self.graph))
    }
}

/// Parses a SMILES string into a single (possibly disconnected) molecule.
///
/// Anything after the first whitespace character is treated as a title and
/// ignored. An empty string is an error.
pub fn parse_molecule(smiles: &str) -> Result<Molecule, SmilesErrors> {
    let text = smiles.trim_start();
    let text = text.split_whitespace().next().unwrap_or("");
    if text.is_empty() {
        return Err(SmilesErrors(vec![SmilesError::EmptyInput]));
    }
    let mut parser = SmilesParser::new(text);
    parser.run();
    parser.finish()
}

/// Parses a SMILES string into one molecule per `.`-separated fragment.
///
/// # Arguments
///
/// * `smiles` - The SMILES string to parse.
///
/// # Returns
///
/// * `Result<Vec<Molecule>, SmilesErrors>` - The fragments in order of their
///   first atom, or every error found in the string.
pub fn parse_smiles(smiles: &str) -> Result<Vec<Molecule>, SmilesErrors> {
    let molecule = parse_molecule(smiles)?;
    let fragments = molecule.split_components();
    debug!("Parsed {smiles} into {} fragment(s)", fragments.len());
    Ok(fragments)
}

impl Molecule {
    pub fn from_smiles(smiles: &str) -> Result<Molecule, SmilesErrors> {
        parse_molecule(smiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::graph::NodeIndex;

    fn parse_one(smiles: &str) -> Molecule {
        Molecule::from_smiles(smiles).expect("Failed to parse SMILES")
    }

    fn first_error(smiles: &str) -> SmilesError {
        parse_molecule(smiles)
            .expect_err("expected a parse error")
            .0
            .remove(0)
    }

    #[test]
    fn test_parse_ethanol() {
        let mol = parse_one("CCO");
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.bond_count(), 2);
        assert_eq!(mol.atom(NodeIndex::new(2)).element, Element::O);
    }

    #[test]
    fn test_parse_branches_and_bond_orders() {
        let mol = parse_one("CC(=O)O");
        assert_eq!(mol.atom_count(), 4);
        let double = mol.bond_between(NodeIndex::new(1), NodeIndex::new(2)).expect("C=O bond");
        assert_eq!(mol.bond(double).order, BondOrder::Double);
        let single = mol.bond_between(NodeIndex::new(1), NodeIndex::new(3)).expect("C-O bond");
        assert_eq!(mol.bond(single).order, BondOrder::Single);
    }

    #[test]
    fn test_parse_benzene_ring_closure() {
        let mol = parse_one("c1ccccc1");
        assert_eq!(mol.atom_count(), 6);
        assert_eq!(mol.bond_count(), 6);
        assert!(mol.bonds().all(|b| mol.bond(b).order == BondOrder::Aromatic));
    }

    #[test]
    fn test_parse_biphenyl_single_link() {
        let mol = parse_one("c1ccccc1-c1ccccc1");
        let link = mol.bond_between(NodeIndex::new(5), NodeIndex::new(6)).expect("link");
        assert_eq!(mol.bond(link).order, BondOrder::Single);
    }

    #[test]
    fn test_parse_percent_ring_closure() {
        let mol = parse_one("C%10CCCC%10");
        assert_eq!(mol.bond_count(), 5);
        let reused = parse_one("C1CC1C1CC1");
        assert_eq!(reused.bond_count(), 7);
    }

    #[test]
    fn test_ring_bond_at_either_end() {
        let mol = parse_one("C=1CCCC1");
        let closure = mol.bond_between(NodeIndex::new(0), NodeIndex::new(4)).expect("closure");
        assert_eq!(mol.bond(closure).order, BondOrder::Double);
        let mol = parse_one("C1CCCC=1");
        let closure = mol.bond_between(NodeIndex::new(0), NodeIndex::new(4)).expect("closure");
        assert_eq!(mol.bond(closure).order, BondOrder::Double);
        assert_eq!(first_error("C=1CCCC#1"), SmilesError::ConflictingRingBond(1, 8));
    }

    #[test]
    fn test_parse_fragments() {
        let fragments = parse_smiles("[Na+].[Cl-]").expect("Failed to parse salt");
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].atom(NodeIndex::new(0)).charge, 1);
        assert_eq!(fragments[1].atom(NodeIndex::new(0)).element, Element::Cl);
        let whole = parse_one("[Na+].[Cl-]");
        assert_eq!(whole.component_count(), 2);
    }

    #[test]
    fn test_parse_chirality_reference_order() {
        let mol = parse_one("N[C@@H](C)C(=O)O");
        let center = mol.atom(NodeIndex::new(1));
        let chirality = center.chirality.as_ref().expect("chiral center");
        assert_eq!(chirality.class, ChiralClass::Clockwise);
        assert_eq!(
            chirality.reference,
            vec![Some(NodeIndex::new(0)), None, Some(NodeIndex::new(2)), Some(NodeIndex::new(3))]
        );
    }

    #[test]
    fn test_chirality_ring_closure_slot() {
        // The ring-closure digit sits where it was written, not where it closes.
        let mol = parse_one("[C@]1(F)(Cl)CCC1");
        let chirality = mol.atom(NodeIndex::new(0)).chirality.clone().expect("chiral center");
        assert_eq!(
            chirality.reference,
            vec![Some(NodeIndex::new(5)), Some(NodeIndex::new(1)), Some(NodeIndex::new(2)), Some(NodeIndex::new(3))]
        );
    }

    #[test]
    fn test_directional_bonds() {
        let mol = parse_one("F/C=C/F");
        let first = mol.bond_between(NodeIndex::new(0), NodeIndex::new(1)).expect("bond");
        let stereo = mol.bond(first).stereo.expect("directional");
        assert_eq!(stereo.direction, Direction::Up);
        assert_eq!(stereo.from, NodeIndex::new(0));
        assert_eq!(stereo.direction_from(NodeIndex::new(1)), Direction::Down);
    }

    #[test]
    fn test_bracket_atoms() {
        let mol = parse_one("[13CH4]");
        let atom = mol.atom(NodeIndex::new(0));
        assert_eq!(atom.isotope, Some(13));
        assert_eq!(atom.explicit_hydrogens, Some(4));
        let mol = parse_one("c1cc[nH]c1");
        assert_eq!(mol.atom(NodeIndex::new(3)).explicit_hydrogens, Some(1));
        assert!(mol.atom(NodeIndex::new(3)).aromatic);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(first_error(""), SmilesError::EmptyInput);
        assert_eq!(first_error("C1CC"), SmilesError::UnclosedRing(1, 1));
        assert_eq!(first_error("CC(C"), SmilesError::UnclosedBranch(2));
        assert_eq!(first_error("CC)C"), SmilesError::BranchEndNoStart(2, ")C".to_string()));
        assert_eq!(first_error("(C)C"), SmilesError::BranchNoCurrentAtom(0, "(C)C".to_string()));
        assert_eq!(first_error("C[CH4"), SmilesError::UnclosedBracket(1));
        assert_eq!(first_error("C[Xy]"), SmilesError::InvalidBracketAtom("Xy".to_string(), 1));
        assert_eq!(first_error("CX"), SmilesError::UnknownElement("X".to_string(), 1));
        assert_eq!(first_error("CC="), SmilesError::DanglingBond('=', 2));
        assert_eq!(first_error("=CC"), SmilesError::BondWithoutAtom('=', 0));
        assert_eq!(first_error("C11"), SmilesError::SelfRingClosure(1, 2));
        assert_eq!(first_error("C12CC12"), SmilesError::DuplicateBond(6, 0, 2));
        assert_eq!(first_error("C()C"), SmilesError::EmptyBranch(1));
        assert_eq!(first_error("C%1C"), SmilesError::InvalidRingLabel(1));
        assert_eq!(first_error("C$C"), SmilesError::UnexpectedCharacter('$', 1));
    }

    #[test]
    fn test_all_errors_reported() {
        let errors = parse_molecule("C(C[Xx]C1").expect_err("invalid");
        assert_eq!(errors.errors().len(), 3);
        assert!(errors.to_string().contains("[Xx]"));
    }

    #[test]
    fn test_title_after_whitespace_ignored() {
        let mol = parse_one("CCO ethanol");
        assert_eq!(mol.atom_count(), 3);
    }
}

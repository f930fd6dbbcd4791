use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use thiserror::Error;

use crate::element::Element;
use crate::enrich::EnrichReport;
use crate::rings::CycleBasis;

/// Stable atom identifier. Atoms are never removed, so ids are never reused.
pub type AtomId = NodeIndex;
pub type BondId = EdgeIndex;
pub type MoleculeGraph = UnGraph<Atom, Bond>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Contribution to the bond-order sum of an endpoint. Aromatic bonds count
    /// as one; the extra π bond is accounted for on the atom.
    pub fn valence(&self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            BondOrder::Single => '-',
            BondOrder::Double => '=',
            BondOrder::Triple => '#',
            BondOrder::Aromatic => ':',
        }
    }
}

/// Direction of a `/` or `\` bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn flipped(&self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Direction::Up => '/',
            Direction::Down => '\\',
        }
    }
}

/// A directional bond marker, as read when walking the bond starting at `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BondStereo {
    pub direction: Direction,
    pub from: AtomId,
}

impl BondStereo {
    /// The marker to write when the bond is walked starting at `start`.
    pub fn direction_from(&self, start: AtomId) -> Direction {
        if start == self.from {
            self.direction
        } else {
            self.direction.flipped()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChiralClass {
    /// `@`
    Anticlockwise,
    /// `@@`
    Clockwise,
}

impl ChiralClass {
    pub fn inverted(&self) -> Self {
        match self {
            ChiralClass::Anticlockwise => ChiralClass::Clockwise,
            ChiralClass::Clockwise => ChiralClass::Anticlockwise,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ChiralClass::Anticlockwise => "@",
            ChiralClass::Clockwise => "@@",
        }
    }
}

/// Tetrahedral chirality, relative to the neighbour order it was written in.
///
/// `None` in the reference order stands for the atom's own hydrogen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chirality {
    pub class: ChiralClass,
    pub reference: Vec<Option<AtomId>>,
}

impl Chirality {
    /// Express this chirality relative to a different neighbour order.
    ///
    /// Returns `None` if `order` is not a permutation of the reference order.
    pub fn class_for_order(&self, order: &[Option<AtomId>]) -> Option<ChiralClass> {
        if order.len() != self.reference.len() {
            return None;
        }
        let mut positions = Vec::with_capacity(order.len());
        for neighbor in order {
            positions.push(self.reference.iter().position(|r| r == neighbor)?);
        }
        // Count inversions to get the permutation parity.
        let mut inversions = 0;
        for i in 0..positions.len() {
            for j in i + 1..positions.len() {
                if positions[i] > positions[j] {
                    inversions += 1;
                }
            }
        }
        if inversions % 2 == 0 {
            Some(self.class)
        } else {
            Some(self.class.inverted())
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Atom {
    pub element: Element,
    pub aromatic: bool,
    pub isotope: Option<u16>,
    pub charge: i8,
    /// Hydrogen count written inside brackets. `Some` for every bracket atom.
    pub explicit_hydrogens: Option<u8>,
    /// Derived at enrichment time for bare atoms.
    pub implicit_hydrogens: u8,
    pub chirality: Option<Chirality>,
    pub class: Option<u16>,
    pub in_ring: bool,
    /// Ids of the SSSR rings this atom belongs to.
    pub rings: Vec<usize>,
}

impl Atom {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            aromatic: false,
            isotope: None,
            charge: 0,
            explicit_hydrogens: None,
            implicit_hydrogens: 0,
            chirality: None,
            class: None,
            in_ring: false,
            rings: Vec::new(),
        }
    }

    pub fn aromatic(element: Element) -> Self {
        Self {
            aromatic: true,
            ..Self::new(element)
        }
    }

    /// Was this atom written in brackets?
    pub fn is_bracket(&self) -> bool {
        self.explicit_hydrogens.is_some()
    }

    /// Hydrogens carried on the atom itself (not hydrogen atoms in the graph).
    pub fn hydrogens(&self) -> u8 {
        self.explicit_hydrogens.unwrap_or(self.implicit_hydrogens)
    }
}

impl Debug for Atom {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        if self.aromatic {
            write!(f, "{}", self.element.aromatic_symbol())?;
        } else {
            write!(f, "{}", self.element)?;
        }
        if self.hydrogens() > 0 {
            write!(f, "H{}", self.hydrogens())?;
        }
        match self.charge {
            0 => {}
            c if c > 0 => write!(f, "+{c}")?,
            c => write!(f, "{c}")?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bond {
    pub order: BondOrder,
    pub stereo: Option<BondStereo>,
    pub in_ring: bool,
}

impl Bond {
    pub fn new(order: BondOrder) -> Self {
        Self {
            order,
            stereo: None,
            in_ring: false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoleculeError {
    #[error("Atom {0} does not exist")]
    UnknownAtom(usize),
    #[error("Atom {0} cannot be bonded to itself")]
    SelfBond(usize),
    #[error("Atoms {0} and {1} are already bonded")]
    DuplicateBond(usize, usize),
    #[error("Atoms {0} and {1} are not bonded")]
    MissingBond(usize, usize),
}

/// A molecular graph: an arena of atoms and bonds addressed by stable ids.
///
/// Derived state (enrichment, ring perception) is cached against a structural
/// generation counter that every mutating method bumps.
#[derive(Clone, Default)]
pub struct Molecule {
    graph: MoleculeGraph,
    generation: u64,
    pub(crate) enrichment: Option<(u64, EnrichReport)>,
    pub(crate) ring_cache: RefCell<Option<Arc<CycleBasis>>>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_graph(graph: MoleculeGraph) -> Self {
        Self {
            graph,
            ..Self::default()
        }
    }

    pub fn graph(&self) -> &MoleculeGraph {
        &self.graph
    }

    /// Mutable access for derived annotations that do not change structure.
    pub(crate) fn graph_mut(&mut self) -> &mut MoleculeGraph {
        &mut self.graph
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation += 1;
        self.enrichment = None;
        self.ring_cache.borrow_mut().take();
    }

    pub fn atom_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn atom(&self, id: AtomId) -> &Atom {
        &self.graph[id]
    }

    pub fn bond(&self, id: BondId) -> &Bond {
        &self.graph[id]
    }

    pub fn atoms(&self) -> impl Iterator<Item = AtomId> + '_ {
        self.graph.node_indices()
    }

    pub fn bonds(&self) -> impl Iterator<Item = BondId> + '_ {
        self.graph.edge_indices()
    }

    pub fn neighbors(&self, id: AtomId) -> impl Iterator<Item = AtomId> + '_ {
        self.graph.neighbors(id)
    }

    /// Neighbours sorted by id, for deterministic traversals.
    pub fn sorted_neighbors(&self, id: AtomId) -> Vec<AtomId> {
        let mut neighbors: Vec<AtomId> = self.graph.neighbors(id).collect();
        neighbors.sort();
        neighbors
    }

    /// Bonds of an atom as `(neighbor, bond)` pairs.
    pub fn bonds_of(&self, id: AtomId) -> impl Iterator<Item = (AtomId, BondId)> + '_ {
        self.graph.edges(id).map(move |e| {
            let other = if e.source() == id { e.target() } else { e.source() };
            (other, e.id())
        })
    }

    pub fn bond_between(&self, a: AtomId, b: AtomId) -> Option<BondId> {
        self.graph.find_edge(a, b)
    }

    pub fn bond_endpoints(&self, id: BondId) -> Option<(AtomId, AtomId)> {
        self.graph.edge_endpoints(id)
    }

    pub fn degree(&self, id: AtomId) -> usize {
        self.graph.edges(id).count()
    }

    /// Number of non-hydrogen neighbours.
    pub fn heavy_degree(&self, id: AtomId) -> usize {
        self.neighbors(id)
            .filter(|&n| !self.graph[n].element.is_hydrogen())
            .count()
    }

    /// Number of hydrogen atoms present as explicit graph nodes.
    pub fn hydrogen_neighbors(&self, id: AtomId) -> usize {
        self.neighbors(id)
            .filter(|&n| self.graph[n].element.is_hydrogen())
            .count()
    }

    /// Hydrogens on the atom plus hydrogen atoms bonded to it.
    pub fn total_hydrogens(&self, id: AtomId) -> usize {
        self.graph[id].hydrogens() as usize + self.hydrogen_neighbors(id)
    }

    /// Sum of bond valences around an atom (aromatic bonds count as one).
    pub fn bond_order_sum(&self, id: AtomId) -> usize {
        self.graph.edges(id).map(|e| e.weight().order.valence() as usize).sum()
    }

    pub fn add_atom(&mut self, atom: Atom) -> AtomId {
        self.touch();
        self.graph.add_node(atom)
    }

    pub fn add_bond(&mut self, a: AtomId, b: AtomId, bond: Bond) -> Result<BondId, MoleculeError> {
        for id in [a, b] {
            if self.graph.node_weight(id).is_none() {
                return Err(MoleculeError::UnknownAtom(id.index()));
            }
        }
        if a == b {
            return Err(MoleculeError::SelfBond(a.index()));
        }
        if self.graph.find_edge(a, b).is_some() {
            return Err(MoleculeError::DuplicateBond(a.index(), b.index()));
        }
        self.touch();
        Ok(self.graph.add_edge(a, b, bond))
    }

    /// Remove the bond between two atoms. Bond ids may be renumbered.
    pub fn remove_bond(&mut self, a: AtomId, b: AtomId) -> Result<Bond, MoleculeError> {
        let edge = self
            .graph
            .find_edge(a, b)
            .ok_or(MoleculeError::MissingBond(a.index(), b.index()))?;
        self.touch();
        self.graph
            .remove_edge(edge)
            .ok_or(MoleculeError::MissingBond(a.index(), b.index()))
    }

    pub fn set_bond_order(&mut self, a: AtomId, b: AtomId, order: BondOrder) -> Result<(), MoleculeError> {
        let edge = self
            .graph
            .find_edge(a, b)
            .ok_or(MoleculeError::MissingBond(a.index(), b.index()))?;
        self.touch();
        self.graph[edge].order = order;
        Ok(())
    }

    pub fn set_charge(&mut self, id: AtomId, charge: i8) -> Result<(), MoleculeError> {
        if self.graph.node_weight(id).is_none() {
            return Err(MoleculeError::UnknownAtom(id.index()));
        }
        self.touch();
        self.graph[id].charge = charge;
        Ok(())
    }

    pub fn set_explicit_hydrogens(&mut self, id: AtomId, count: Option<u8>) -> Result<(), MoleculeError> {
        if self.graph.node_weight(id).is_none() {
            return Err(MoleculeError::UnknownAtom(id.index()));
        }
        self.touch();
        self.graph[id].explicit_hydrogens = count;
        Ok(())
    }

    /// Connected components, each sorted by atom id, ordered by first atom.
    pub fn components(&self) -> Vec<Vec<AtomId>> {
        let mut seen = vec![false; self.atom_count()];
        let mut components = Vec::new();
        for start in self.atoms() {
            if seen[start.index()] {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start];
            seen[start.index()] = true;
            while let Some(node) = stack.pop() {
                component.push(node);
                for next in self.neighbors(node) {
                    if !seen[next.index()] {
                        seen[next.index()] = true;
                        stack.push(next);
                    }
                }
            }
            component.sort();
            components.push(component);
        }
        components
    }

    pub fn component_count(&self) -> usize {
        self.components().len()
    }

    /// Copy the given atoms (and the bonds among them) into a new molecule.
    ///
    /// Atom ids are renumbered in the order given; chirality references and
    /// bond stereo anchors are remapped.
    pub fn extract(&self, atoms: &[AtomId]) -> Molecule {
        let mut mapping: BTreeMap<AtomId, AtomId> = BTreeMap::new();
        let mut graph = MoleculeGraph::default();
        for &old in atoms {
            let new = graph.add_node(self.graph[old].clone());
            mapping.insert(old, new);
        }
        for node in graph.node_indices() {
            if let Some(chirality) = graph[node].chirality.as_mut() {
                chirality.reference = chirality
                    .reference
                    .iter()
                    .map(|r| r.and_then(|old| mapping.get(&old).copied()))
                    .collect();
            }
        }
        for edge in self.graph.edge_references() {
            if let (Some(&a), Some(&b)) = (mapping.get(&edge.source()), mapping.get(&edge.target())) {
                let mut bond = edge.weight().clone();
                if let Some(stereo) = bond.stereo.as_mut() {
                    stereo.from = mapping[&stereo.from];
                }
                graph.add_edge(a, b, bond);
            }
        }
        Molecule::from_graph(graph)
    }

    /// Split into one molecule per connected component.
    pub fn split_components(&self) -> Vec<Molecule> {
        self.components()
            .iter()
            .map(|component| self.extract(component))
            .collect()
    }
}

impl Debug for Molecule {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("Molecule")
            .field("atoms", &self.graph.node_weights().collect::<Vec<_>>())
            .field(
                "bonds",
                &self
                    .graph
                    .edge_references()
                    .map(|e| (e.source().index(), e.target().index(), e.weight().order))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

//! Ring perception: the smallest set of smallest rings (a minimum cycle basis).

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::*;

use crate::enrich::ring_bond_flags;
use crate::molecule::*;

/// Bounds on cycle enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingLimits {
    /// Longest cycle considered as a candidate.
    pub max_cycle_length: usize,
    /// `(atom count, max length)` pairs: molecules with more atoms than the
    /// threshold search no further than the given length.
    pub size_thresholds: Vec<(usize, usize)>,
    /// Ring systems with at most this many ring atoms enumerate every cycle
    /// by DFS; larger ones use shortest-path candidates.
    pub dfs_atom_limit: usize,
    /// DFS gives up and falls back to shortest-path candidates past this many.
    pub max_candidates: usize,
}

impl Default for RingLimits {
    fn default() -> Self {
        Self {
            max_cycle_length: 32,
            size_thresholds: vec![(200, 20), (1000, 12)],
            dfs_atom_limit: 40,
            max_candidates: 100_000,
        }
    }
}

impl RingLimits {
    pub fn with_max_cycle_length(mut self, length: usize) -> Self {
        self.max_cycle_length = length;
        self
    }

    pub fn with_size_thresholds(mut self, thresholds: Vec<(usize, usize)>) -> Self {
        self.size_thresholds = thresholds;
        self
    }

    pub fn with_dfs_atom_limit(mut self, limit: usize) -> Self {
        self.dfs_atom_limit = limit;
        self
    }

    /// The maximum cycle length that applies to a molecule of `atom_count` atoms.
    pub fn effective_max_length(&self, atom_count: usize) -> usize {
        self.size_thresholds
            .iter()
            .filter(|(threshold, _)| atom_count > *threshold)
            .map(|(_, length)| *length)
            .fold(self.max_cycle_length, usize::min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingStatus {
    Complete,
    /// The cycle search stopped short of a full basis.
    Truncated {
        found: usize,
        expected: usize,
        max_cycle_length: usize,
    },
}

/// Cycles of the basis, cached on the molecule until its structure changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleBasis {
    pub cycles: Vec<Vec<AtomId>>,
    pub expected: usize,
    pub status: RingStatus,
    limits: RingLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingKind {
    Aliphatic,
    Aromatic,
    /// Non-aromatic with at least one non-carbon member.
    Heterocyclic,
    AromaticHeterocyclic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    pub id: usize,
    /// Atoms in walk order, starting from the smallest id.
    pub atoms: Vec<AtomId>,
    pub bonds: Vec<BondId>,
    pub aromatic: bool,
    pub kind: RingKind,
    pub fused: bool,
    pub bridged: bool,
    pub spiro: bool,
    pub system: usize,
}

impl Ring {
    pub fn size(&self) -> usize {
        self.atoms.len()
    }

    pub fn contains(&self, atom: AtomId) -> bool {
        self.atoms.contains(&atom)
    }

    pub fn contains_bond(&self, bond: BondId) -> bool {
        self.bonds.contains(&bond)
    }

    pub fn is_heterocyclic(&self) -> bool {
        matches!(self.kind, RingKind::Heterocyclic | RingKind::AromaticHeterocyclic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingSet {
    pub rings: Vec<Ring>,
    /// Basis size: `bonds - atoms + components`.
    pub expected: usize,
    pub status: RingStatus,
}

impl RingSet {
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.status == RingStatus::Complete
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ring> {
        self.rings.iter()
    }

    pub fn rings_of(&self, atom: AtomId) -> impl Iterator<Item = &Ring> {
        self.rings.iter().filter(move |ring| ring.contains(atom))
    }

    pub fn ring_count_of(&self, atom: AtomId) -> usize {
        self.rings_of(atom).count()
    }

    pub fn smallest_ring_size(&self, atom: AtomId) -> Option<usize> {
        self.rings_of(atom).map(Ring::size).min()
    }

    pub fn system_count(&self) -> usize {
        self.rings.iter().map(|ring| ring.system + 1).max().unwrap_or(0)
    }
}

/// Rotate a cycle to start at its smallest atom, then walk toward the
/// smaller of its two neighbours.
fn normalize_cycle(cycle: &[AtomId]) -> Vec<AtomId> {
    let len = cycle.len();
    let start = match cycle.iter().enumerate().min_by_key(|&(_, atom)| *atom) {
        Some((index, _)) => index,
        None => return Vec::new(),
    };
    let mut normalized: Vec<AtomId> = (0..len).map(|i| cycle[(start + i) % len]).collect();
    if len > 2 && normalized[1] > normalized[len - 1] {
        normalized[1..].reverse();
    }
    normalized
}

fn ring_adjacency(mol: &Molecule, ring_bonds: &[bool]) -> Vec<Vec<AtomId>> {
    let mut adjacency = vec![Vec::new(); mol.atom_count()];
    for bond in mol.bonds() {
        if !ring_bonds[bond.index()] {
            continue;
        }
        if let Some((a, b)) = mol.bond_endpoints(bond) {
            adjacency[a.index()].push(b);
            adjacency[b.index()].push(a);
        }
    }
    for neighbors in adjacency.iter_mut() {
        neighbors.sort();
    }
    adjacency
}

/// Every elementary cycle up to `max_length`, each found from its smallest atom.
///
/// Returns `None` once more than `max_candidates` cycles have been seen, or
/// the walk itself grows past a multiple of that.
fn dfs_candidates(
    adjacency: &[Vec<AtomId>],
    ring_atoms: &[AtomId],
    max_length: usize,
    max_candidates: usize,
) -> Option<Vec<Vec<AtomId>>> {
    let mut candidates = Vec::new();
    let mut on_path = vec![false; adjacency.len()];
    let mut steps = 0usize;

    for &start in ring_atoms {
        let mut path = vec![start];
        on_path[start.index()] = true;
        // (atom, next neighbour index to try)
        let mut stack: Vec<(AtomId, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            if frame.1 >= adjacency[node.index()].len() {
                stack.pop();
                path.pop();
                on_path[node.index()] = false;
                continue;
            }
            let neighbor = adjacency[node.index()][frame.1];
            frame.1 += 1;
            steps += 1;
            if steps > max_candidates.saturating_mul(16) {
                return None;
            }

            if neighbor == start && path.len() >= 3 {
                // Each cycle is walked in both directions; keep one.
                if path[1] < path[path.len() - 1] {
                    candidates.push(path.clone());
                    if candidates.len() > max_candidates {
                        return None;
                    }
                }
            } else if neighbor > start && !on_path[neighbor.index()] && path.len() < max_length {
                on_path[neighbor.index()] = true;
                path.push(neighbor);
                stack.push((neighbor, 0));
            }
        }
    }
    Some(candidates)
}

/// Shortest-path cycles: for every atom `w` and ring bond `(u, v)`, the cycle
/// `w..u` + `u-v` + `v..w` when the two paths only meet at `w`.
fn bfs_candidates(
    mol: &Molecule,
    adjacency: &[Vec<AtomId>],
    ring_atoms: &[AtomId],
    ring_bonds: &[bool],
    max_length: usize,
) -> Vec<Vec<AtomId>> {
    let n = adjacency.len();
    let edges: Vec<(AtomId, AtomId)> = mol
        .bonds()
        .filter(|bond| ring_bonds[bond.index()])
        .filter_map(|bond| mol.bond_endpoints(bond))
        .collect();
    let mut candidates = Vec::new();

    for &root in ring_atoms {
        let mut distance = vec![usize::MAX; n];
        let mut parent: Vec<Option<AtomId>> = vec![None; n];
        distance[root.index()] = 0;
        let mut queue = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            let d = distance[node.index()];
            if 2 * (d + 1) > max_length + 1 {
                continue;
            }
            for &next in &adjacency[node.index()] {
                if distance[next.index()] == usize::MAX {
                    distance[next.index()] = d + 1;
                    parent[next.index()] = Some(node);
                    queue.push_back(next);
                }
            }
        }

        let path_to = |target: AtomId| -> Vec<AtomId> {
            let mut path = vec![target];
            let mut current = target;
            while let Some(previous) = parent[current.index()] {
                path.push(previous);
                current = previous;
            }
            path.reverse();
            path
        };

        for &(u, v) in &edges {
            let (du, dv) = (distance[u.index()], distance[v.index()]);
            if du == usize::MAX || dv == usize::MAX {
                continue;
            }
            let size = du + dv + 1;
            if size < 3 || size > max_length {
                continue;
            }
            let path_u = path_to(u);
            let path_v = path_to(v);
            if path_u[1..].iter().any(|atom| path_v[1..].contains(atom)) {
                continue;
            }
            let mut cycle = path_u;
            cycle.extend(path_v[1..].iter().rev());
            candidates.push(cycle);
        }
    }
    candidates
}

/// Incremental Gaussian elimination over GF(2), rows keyed by pivot bit.
#[derive(Default)]
struct EdgeSpace {
    rows: BTreeMap<usize, Vec<u64>>,
}

impl EdgeSpace {
    fn leading_bit(vector: &[u64]) -> Option<usize> {
        vector
            .iter()
            .enumerate()
            .find(|(_, word)| **word != 0)
            .map(|(i, word)| i * 64 + word.trailing_zeros() as usize)
    }

    /// Add the vector if it is independent of the rows so far.
    fn try_insert(&mut self, mut vector: Vec<u64>) -> bool {
        while let Some(pivot) = Self::leading_bit(&vector) {
            match self.rows.get(&pivot) {
                Some(row) => {
                    for (word, other) in vector.iter_mut().zip(row) {
                        *word ^= *other;
                    }
                }
                None => {
                    self.rows.insert(pivot, vector);
                    return true;
                }
            }
        }
        false
    }
}

fn edge_vector(mol: &Molecule, cycle: &[AtomId]) -> Vec<u64> {
    let mut vector = vec![0u64; mol.bond_count().div_ceil(64)];
    for i in 0..cycle.len() {
        if let Some(bond) = mol.bond_between(cycle[i], cycle[(i + 1) % cycle.len()]) {
            vector[bond.index() / 64] |= 1u64 << (bond.index() % 64);
        }
    }
    vector
}

/// `bonds - atoms + components`.
pub fn expected_ring_count(mol: &Molecule) -> usize {
    (mol.bond_count() + mol.component_count()).saturating_sub(mol.atom_count())
}

fn compute_basis(mol: &Molecule, limits: &RingLimits) -> CycleBasis {
    let expected = expected_ring_count(mol);
    let max_length = limits.effective_max_length(mol.atom_count());
    let done = |cycles: Vec<Vec<AtomId>>, status| CycleBasis {
        cycles,
        expected,
        status,
        limits: limits.clone(),
    };
    if expected == 0 {
        return done(Vec::new(), RingStatus::Complete);
    }

    let ring_bonds = ring_bond_flags(mol);
    let adjacency = ring_adjacency(mol, &ring_bonds);
    let ring_atoms: Vec<AtomId> = mol
        .atoms()
        .filter(|atom| !adjacency[atom.index()].is_empty())
        .collect();

    let dfs = if ring_atoms.len() <= limits.dfs_atom_limit {
        let found = dfs_candidates(&adjacency, &ring_atoms, max_length, limits.max_candidates);
        if found.is_none() {
            debug!("Cycle enumeration passed {} candidates, using shortest paths", limits.max_candidates);
        }
        found
    } else {
        None
    };
    let raw = match dfs {
        Some(candidates) => candidates,
        None => bfs_candidates(mol, &adjacency, &ring_atoms, &ring_bonds, max_length),
    };

    let mut candidates: Vec<Vec<AtomId>> = raw.iter().map(|cycle| normalize_cycle(cycle)).collect();
    candidates.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    candidates.dedup();
    trace!("{} candidate cycles for a basis of {expected}", candidates.len());

    let mut space = EdgeSpace::default();
    let mut cycles = Vec::with_capacity(expected);
    for candidate in candidates {
        if cycles.len() == expected {
            break;
        }
        if space.try_insert(edge_vector(mol, &candidate)) {
            cycles.push(candidate);
        }
    }

    if cycles.len() < expected {
        warn!(
            "Ring perception truncated: found {} of {expected} rings with cycles up to length {max_length}",
            cycles.len()
        );
        let found = cycles.len();
        return done(
            cycles,
            RingStatus::Truncated {
                found,
                expected,
                max_cycle_length: max_length,
            },
        );
    }
    done(cycles, RingStatus::Complete)
}

/// The cached cycle basis, recomputed when the limits differ.
pub(crate) fn cycle_basis(mol: &Molecule, limits: &RingLimits) -> Arc<CycleBasis> {
    if let Some(cached) = mol.ring_cache.borrow().as_ref() {
        if cached.limits == *limits {
            return Arc::clone(cached);
        }
    }
    let basis = Arc::new(compute_basis(mol, limits));
    *mol.ring_cache.borrow_mut() = Some(Arc::clone(&basis));
    basis
}

fn find_system(systems: &mut [usize], ring: usize) -> usize {
    let mut root = ring;
    while systems[root] != root {
        root = systems[root];
    }
    systems[ring] = root;
    root
}

fn annotate(mol: &Molecule, basis: &CycleBasis) -> RingSet {
    let mut rings: Vec<Ring> = basis
        .cycles
        .iter()
        .enumerate()
        .map(|(id, atoms)| {
            let bonds: Vec<BondId> = (0..atoms.len())
                .filter_map(|i| mol.bond_between(atoms[i], atoms[(i + 1) % atoms.len()]))
                .collect();
            let aromatic = atoms.iter().all(|&atom| mol.atom(atom).aromatic)
                && bonds.iter().all(|&bond| mol.bond(bond).order == BondOrder::Aromatic);
            let hetero = atoms.iter().any(|&atom| mol.atom(atom).element.is_hetero());
            let kind = match (aromatic, hetero) {
                (true, true) => RingKind::AromaticHeterocyclic,
                (true, false) => RingKind::Aromatic,
                (false, true) => RingKind::Heterocyclic,
                (false, false) => RingKind::Aliphatic,
            };
            Ring {
                id,
                atoms: atoms.clone(),
                bonds,
                aromatic,
                kind,
                fused: false,
                bridged: false,
                spiro: false,
                system: id,
            }
        })
        .collect();

    let mut systems: Vec<usize> = (0..rings.len()).collect();
    for i in 0..rings.len() {
        for j in i + 1..rings.len() {
            let shared_atoms = rings[i].atoms.iter().filter(|a| rings[j].contains(**a)).count();
            if shared_atoms == 0 {
                continue;
            }
            let shared_bonds = rings[i].bonds.iter().filter(|b| rings[j].contains_bond(**b)).count();
            let fused = shared_bonds > 0;
            let bridged = shared_atoms > 2 || (shared_bonds == 0 && shared_atoms == 2);
            let spiro = shared_atoms == 1;
            for k in [i, j] {
                rings[k].fused |= fused;
                rings[k].bridged |= bridged;
                rings[k].spiro |= spiro;
            }
            let (a, b) = (find_system(&mut systems, i), find_system(&mut systems, j));
            systems[a.max(b)] = a.min(b);
        }
    }

    // Number systems by first appearance.
    let mut numbering: BTreeMap<usize, usize> = BTreeMap::new();
    for i in 0..rings.len() {
        let root = find_system(&mut systems, i);
        let next = numbering.len();
        rings[i].system = *numbering.entry(root).or_insert(next);
    }

    RingSet {
        rings,
        expected: basis.expected,
        status: basis.status,
    }
}

/// Computes the SSSR and classifies its rings.
///
/// # Arguments
///
/// * `mol` - The molecule. It does not need to be enriched.
/// * `limits` - Bounds on the cycle search.
///
/// # Returns
///
/// * `RingSet` - The rings in SSSR order, with `RingStatus::Truncated` when the
///   limits kept the basis short.
#[instrument(skip_all, fields(atoms = mol.atom_count(), bonds = mol.bond_count()))]
pub fn find_rings(mol: &Molecule, limits: &RingLimits) -> RingSet {
    let basis = cycle_basis(mol, limits);
    let rings = annotate(mol, &basis);
    debug!("Found {} of {} rings", rings.len(), rings.expected);
    rings
}

/// Record on each atom the ids of the rings it belongs to.
pub fn assign_ring_ids(mol: &mut Molecule, rings: &RingSet) {
    let graph = mol.graph_mut();
    for atom in graph.node_weights_mut() {
        atom.rings.clear();
    }
    for ring in &rings.rings {
        for &atom in &ring.atoms {
            graph[atom].rings.push(ring.id);
        }
    }
}

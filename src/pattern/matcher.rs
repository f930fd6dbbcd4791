use std::borrow::Cow;
use std::collections::BTreeSet;

use tracing::*;

use super::*;
use crate::enrich::{ensure_enriched, is_enriched};
use crate::rings::{find_rings, RingLimits};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOptions {
    /// Stop after this many matches.
    pub max_matches: Option<usize>,
    /// Report each set of molecule atoms once.
    pub unique_only: bool,
    /// Give up on patterns with more atoms than this.
    pub max_depth: Option<usize>,
    /// Give up after this many candidate atoms have been tried.
    pub max_steps: Option<usize>,
    pub ring_limits: RingLimits,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_matches: None,
            unique_only: false,
            max_depth: None,
            max_steps: Some(1_000_000),
            ring_limits: RingLimits::default(),
        }
    }
}

impl MatchOptions {
    pub fn with_max_matches(mut self, max: usize) -> Self {
        self.max_matches = Some(max);
        self
    }

    pub fn with_unique_only(mut self, unique: bool) -> Self {
        self.unique_only = unique;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_steps(mut self, steps: Option<usize>) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn with_ring_limits(mut self, limits: RingLimits) -> Self {
        self.ring_limits = limits;
        self
    }
}

/// One embedding of a pattern. Indexed by pattern atom and pattern bond.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Match {
    pub atoms: Vec<AtomId>,
    pub bonds: Vec<BondId>,
}

impl Match {
    /// The matched molecule atoms, sorted.
    pub fn atom_set(&self) -> BTreeSet<AtomId> {
        self.atoms.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Complete,
    MatchLimitReached,
    StepLimitReached,
    DepthLimitExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matches: Vec<Match>,
    pub status: SearchStatus,
    pub steps: usize,
}

impl MatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == SearchStatus::Complete
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// A pattern atom in search order, with the bond that reaches it and the
/// extra bonds to verify once it is bound.
struct PlanStep {
    atom: usize,
    parent: Option<(usize, usize)>,
    closures: Vec<usize>,
}

/// Depth-first order over each connected piece of the pattern.
fn plan(pattern: &Pattern) -> Vec<PlanStep> {
    let n = pattern.atom_count();
    let mut position = vec![usize::MAX; n];
    let mut tree_bond = vec![false; pattern.bond_count()];
    let mut steps: Vec<PlanStep> = Vec::with_capacity(n);

    for root in 0..n {
        if position[root] != usize::MAX {
            continue;
        }
        let mut stack = vec![(root, None)];
        while let Some((atom, parent)) = stack.pop() {
            if position[atom] != usize::MAX {
                continue;
            }
            if let Some((_, bond)) = parent {
                tree_bond[bond] = true;
            }
            position[atom] = steps.len();
            steps.push(PlanStep {
                atom,
                parent,
                closures: Vec::new(),
            });
            for (next, bond) in pattern.neighbors(atom).into_iter().rev() {
                if position[next] == usize::MAX {
                    stack.push((next, Some((atom, bond))));
                }
            }
        }
    }

    // Every other bond is checked when its later endpoint is bound.
    for (index, bond) in pattern.bonds.iter().enumerate() {
        if !tree_bond[index] {
            let later = position[bond.begin].max(position[bond.end]);
            steps[later].closures.push(index);
        }
    }
    steps
}

#[derive(Clone)]
struct State {
    atoms: Vec<Option<AtomId>>,
    bonds: Vec<Option<BondId>>,
    used_atoms: BTreeSet<AtomId>,
    used_bonds: BTreeSet<BondId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct Searcher<'a> {
    pattern: &'a Pattern,
    mol: &'a Molecule,
    options: &'a MatchOptions,
    plan: Vec<PlanStep>,
    ring_counts: Vec<usize>,
    ring_sizes: Vec<Vec<usize>>,
    ring_bonds: Vec<usize>,
    matches: Vec<Match>,
    seen: BTreeSet<BTreeSet<AtomId>>,
    steps: usize,
    status: SearchStatus,
}

impl<'a> Searcher<'a> {
    fn atom_matches(&self, pattern_atom: usize, atom: AtomId) -> bool {
        let target = TargetAtom {
            mol: self.mol,
            id: atom,
            ring_count: self.ring_counts[atom.index()],
            ring_sizes: &self.ring_sizes[atom.index()],
            ring_bonds: self.ring_bonds[atom.index()],
        };
        self.pattern.atoms[pattern_atom].expr.matches(&target)
    }

    fn record(&mut self, state: &State) -> Flow {
        let found = Match {
            atoms: state.atoms.iter().flatten().copied().collect(),
            bonds: state.bonds.iter().flatten().copied().collect(),
        };
        if self.options.unique_only && !self.seen.insert(found.atom_set()) {
            return Flow::Continue;
        }
        self.matches.push(found);
        match self.options.max_matches {
            Some(max) if self.matches.len() >= max => {
                self.status = SearchStatus::MatchLimitReached;
                Flow::Stop
            }
            _ => Flow::Continue,
        }
    }

    /// Bind `atom` for the current step, checking its closure bonds.
    fn bind(&self, state: &State, step: &PlanStep, atom: AtomId, via: Option<BondId>) -> Option<State> {
        let mut next = state.clone();
        next.atoms[step.atom] = Some(atom);
        next.used_atoms.insert(atom);
        if let (Some((_, pattern_bond)), Some(bond)) = (step.parent, via) {
            next.bonds[pattern_bond] = Some(bond);
            next.used_bonds.insert(bond);
        }
        for &closure in &step.closures {
            let pattern_bond = &self.pattern.bonds[closure];
            let other = next.atoms[pattern_bond.other(step.atom)]?;
            let bond = self.mol.bond_between(atom, other)?;
            let data = self.mol.bond(bond);
            if !data.in_ring || next.used_bonds.contains(&bond) || !pattern_bond.expr.matches(data) {
                return None;
            }
            next.bonds[closure] = Some(bond);
            next.used_bonds.insert(bond);
        }
        Some(next)
    }

    fn extend(&mut self, depth: usize, state: State) -> Flow {
        if depth == self.plan.len() {
            return self.record(&state);
        }
        if self.options.max_depth.map_or(false, |max| depth >= max) {
            self.status = SearchStatus::DepthLimitExceeded;
            return Flow::Stop;
        }

        let step = &self.plan[depth];
        let mut candidates: Vec<(AtomId, Option<BondId>)> = match step.parent {
            None => self.mol.atoms().map(|atom| (atom, None)).collect(),
            Some((parent, pattern_bond)) => {
                let expr = &self.pattern.bonds[pattern_bond].expr;
                match state.atoms[parent] {
                    Some(anchor) => self
                        .mol
                        .bonds_of(anchor)
                        .filter(|&(_, bond)| !state.used_bonds.contains(&bond) && expr.matches(self.mol.bond(bond)))
                        .map(|(atom, bond)| (atom, Some(bond)))
                        .collect(),
                    None => Vec::new(),
                }
            }
        };
        candidates.sort();
        candidates.retain(|(atom, _)| !state.used_atoms.contains(atom));

        for (atom, via) in candidates {
            self.steps += 1;
            if self.options.max_steps.map_or(false, |max| self.steps > max) {
                self.status = SearchStatus::StepLimitReached;
                return Flow::Stop;
            }
            let step = &self.plan[depth];
            if !self.atom_matches(step.atom, atom) {
                continue;
            }
            let next = match self.bind(&state, step, atom, via) {
                Some(next) => next,
                None => continue,
            };
            if self.extend(depth + 1, next) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }
}

/// Finds every embedding of `pattern` in `mol`.
///
/// The molecule's own annotations are used when they are current; otherwise
/// a private enriched copy is searched. Aromaticity is taken as it is, so
/// run perception first to match aromatic patterns against Kekulé input.
#[instrument(skip_all, fields(pattern = pattern.text(), atoms = mol.atom_count()))]
pub fn find_matches(pattern: &Pattern, mol: &Molecule, options: &MatchOptions) -> MatchOutcome {
    let mol: Cow<Molecule> = if is_enriched(mol) {
        Cow::Borrowed(mol)
    } else {
        let mut copy = mol.clone();
        ensure_enriched(&mut copy);
        Cow::Owned(copy)
    };
    let mol = mol.as_ref();

    let rings = find_rings(mol, &options.ring_limits);
    let n = mol.atom_count();
    let ring_counts = (0..n).map(|i| rings.ring_count_of(AtomId::new(i))).collect();
    let ring_sizes = (0..n)
        .map(|i| rings.rings_of(AtomId::new(i)).map(|ring| ring.size()).collect())
        .collect();
    let ring_bonds = mol
        .atoms()
        .map(|atom| mol.bonds_of(atom).filter(|&(_, bond)| mol.bond(bond).in_ring).count())
        .collect();

    let mut searcher = Searcher {
        pattern,
        mol,
        options,
        plan: plan(pattern),
        ring_counts,
        ring_sizes,
        ring_bonds,
        matches: Vec::new(),
        seen: BTreeSet::new(),
        steps: 0,
        status: SearchStatus::Complete,
    };
    let state = State {
        atoms: vec![None; pattern.atom_count()],
        bonds: vec![None; pattern.bond_count()],
        used_atoms: BTreeSet::new(),
        used_bonds: BTreeSet::new(),
    };
    searcher.extend(0, state);

    if searcher.status != SearchStatus::Complete {
        debug!("Search stopped early: {:?} after {} steps", searcher.status, searcher.steps);
    }
    trace!("Found {} matches in {} steps", searcher.matches.len(), searcher.steps);
    MatchOutcome {
        matches: searcher.matches,
        status: searcher.status,
        steps: searcher.steps,
    }
}

impl Molecule {
    /// Does `pattern` occur anywhere in this molecule?
    pub fn has_match(&self, pattern: &Pattern) -> bool {
        !find_matches(pattern, self, &MatchOptions::default().with_max_matches(1)).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aromaticity::{perceive_aromaticity, AromaticityOptions};
    use crate::parse::parse_molecule;

    fn prepared(smiles: &str) -> Molecule {
        let mut mol = parse_molecule(smiles).expect("Failed to parse SMILES");
        perceive_aromaticity(&mut mol, &AromaticityOptions::default());
        mol
    }

    fn count(pattern: &str, smiles: &str, options: &MatchOptions) -> usize {
        let pattern = compile_pattern(pattern).expect("Failed to compile pattern");
        find_matches(&pattern, &prepared(smiles), options).len()
    }

    fn unique() -> MatchOptions {
        MatchOptions::default().with_unique_only(true)
    }

    #[test]
    fn test_hydroxyl_in_ethanol() {
        let pattern = compile_pattern("[OH]").expect("Failed to compile");
        let outcome = find_matches(&pattern, &prepared("CCO"), &MatchOptions::default());
        assert!(outcome.is_complete());
        assert_eq!(outcome.matches, vec![Match {
            atoms: vec![AtomId::new(2)],
            bonds: vec![],
        }]);
    }

    #[test]
    fn test_carbonyl_in_acetic_acid() {
        let pattern = compile_pattern("C=O").expect("Failed to compile");
        let outcome = find_matches(&pattern, &prepared("CC(=O)O"), &MatchOptions::default());
        assert_eq!(outcome.len(), 1);
        assert_eq!(outcome.matches[0].atoms, vec![AtomId::new(1), AtomId::new(2)]);
        assert_eq!(count("[#6][OX2H]", "CC(=O)O", &MatchOptions::default()), 1);
    }

    #[test]
    fn test_symmetric_matches_and_uniqueness() {
        assert_eq!(count("CC", "CCC", &MatchOptions::default()), 4);
        assert_eq!(count("CC", "CCC", &unique()), 2);
        assert_eq!(count("c1ccccc1", "c1ccccc1", &MatchOptions::default()), 12);
        assert_eq!(count("c1ccccc1", "c1ccccc1", &unique()), 1);
    }

    #[test]
    fn test_benzene_in_naphthalene() {
        let pattern = compile_pattern("c1ccccc1").expect("Failed to compile");
        let outcome = find_matches(&pattern, &prepared("c1ccc2ccccc2c1"), &unique());
        assert_eq!(outcome.len(), 2);
        let covered: BTreeSet<AtomId> = outcome.matches.iter().flat_map(|m| m.atoms.iter().copied()).collect();
        assert_eq!(covered.len(), 10);
    }

    #[test]
    fn test_kekule_input_matches_aromatic_pattern() {
        assert_eq!(count("c1ccccc1", "C1=CC=CC=C1", &unique()), 1);
        assert_eq!(count("C=C", "C1=CC=CC=C1", &MatchOptions::default()), 0);
    }

    #[test]
    fn test_ring_closure_requires_ring_bond() {
        assert_eq!(count("C1CCC1", "C1CCC1", &unique()), 1);
        assert_eq!(count("C1CC1", "CCCC", &unique()), 0);
        assert_eq!(count("C1CCCCC1", "C1CCC1", &unique()), 0);
    }

    #[test]
    fn test_ring_primitives() {
        assert_eq!(count("[R]", "C1CC1CC", &unique()), 3);
        assert_eq!(count("[R0]", "C1CC1CC", &unique()), 2);
        assert_eq!(count("[r3]", "C1CC1C1CCCC1", &unique()), 3);
        assert_eq!(count("[R2]", "c1ccc2ccccc2c1", &unique()), 2);
        assert_eq!(count("[x3]", "c1ccc2ccccc2c1", &unique()), 2);
        assert_eq!(count("C!@C", "C1CC1CC", &unique()), 2);
        assert_eq!(count("C@C", "C1CC1CC", &unique()), 3);
    }

    #[test]
    fn test_wildcards_and_disconnected_patterns() {
        assert_eq!(count("*~*", "CC=O", &unique()), 2);
        assert_eq!(count("[!#6]", "CC(=O)N", &unique()), 2);
        assert_eq!(count("C.O", "CCO", &unique()), 2);
        assert_eq!(count("[a]", "c1ccncc1CC", &unique()), 6);
        assert_eq!(count("[n;X2]", "c1ccncc1", &unique()), 1);
    }

    #[test]
    fn test_match_limit() {
        let pattern = compile_pattern("C").expect("Failed to compile");
        let outcome = find_matches(&pattern, &prepared("CCCCC"), &MatchOptions::default().with_max_matches(2));
        assert_eq!(outcome.len(), 2);
        assert_eq!(outcome.status, SearchStatus::MatchLimitReached);
    }

    #[test]
    fn test_step_and_depth_limits() {
        let pattern = compile_pattern("CCCC").expect("Failed to compile");
        let mol = prepared("CCCCCCCC");
        let outcome = find_matches(&pattern, &mol, &MatchOptions::default().with_max_steps(Some(3)));
        assert_eq!(outcome.status, SearchStatus::StepLimitReached);
        let outcome = find_matches(&pattern, &mol, &MatchOptions::default().with_max_depth(2));
        assert_eq!(outcome.status, SearchStatus::DepthLimitExceeded);
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_unenriched_molecule_is_not_modified() {
        let mol = parse_molecule("CCO").expect("Failed to parse SMILES");
        let generation = mol.generation();
        assert!(mol.has_match(&compile_pattern("[CH3]").expect("Failed to compile")));
        assert_eq!(mol.generation(), generation);
        assert!(!is_enriched(&mol));
    }

    #[test]
    fn test_empty_molecule_has_no_matches() {
        let pattern = compile_pattern("C").expect("Failed to compile");
        let outcome = find_matches(&pattern, &Molecule::new(), &MatchOptions::default());
        assert!(outcome.is_empty());
        assert!(outcome.is_complete());
    }
}

//! Graph enrichment: implicit hydrogens, ring-membership flags and valence checks.

use std::fmt::{Display, Formatter, Result as FmtResult};

use thiserror::Error;
use tracing::*;

use crate::element::Element;
use crate::molecule::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichOptions {
    /// Turn valence warnings into a hard error.
    pub strict: bool,
}

impl EnrichOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// An atom whose bonds and hydrogens exceed every allowed valence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValenceWarning {
    pub atom: AtomId,
    pub element: Element,
    pub charge: i8,
    pub valence: usize,
    pub allowed: Vec<u8>,
}

impl Display for ValenceWarning {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "atom {} ({}, charge {}) has valence {}, allowed {:?}",
            self.atom.index(),
            self.element,
            self.charge,
            self.valence,
            self.allowed
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValenceError {
    #[error("Atom {0} ({1}) has valence {2}, allowed {3:?}")]
    InvalidValence(usize, Element, usize, Vec<u8>),
}

impl From<&ValenceWarning> for ValenceError {
    fn from(warning: &ValenceWarning) -> Self {
        ValenceError::InvalidValence(
            warning.atom.index(),
            warning.element,
            warning.valence,
            warning.allowed.clone(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub warnings: Vec<ValenceWarning>,
    pub ring_atoms: usize,
    pub ring_bonds: usize,
    pub implicit_hydrogens: usize,
}

impl EnrichReport {
    fn check(&self, options: &EnrichOptions) -> Result<(), ValenceError> {
        match self.warnings.first() {
            Some(warning) if options.strict => Err(warning.into()),
            _ => Ok(()),
        }
    }
}

/// Hydrogens a bare (unbracketed) atom gets from its bonds.
///
/// Aromatic bonds count one; an aromatic atom claims one more for its π bond
/// when its lowest fitting valence leaves room for it.
pub fn bare_hydrogens(mol: &Molecule, id: AtomId) -> u8 {
    let atom = mol.atom(id);
    let valences = atom.element.allowed_valences(atom.charge);
    let mut sum = mol.bond_order_sum(id);
    let target = match valences.iter().map(|&v| v as usize).find(|&v| v >= sum) {
        Some(target) => target,
        None => return 0,
    };
    if atom.aromatic && sum < target {
        sum += 1;
    }
    (target - sum) as u8
}

/// Bond orders plus carried hydrogens, counting an aromatic atom's π bond
/// the same way [`bare_hydrogens`] does.
pub fn total_valence(mol: &Molecule, id: AtomId) -> usize {
    let atom = mol.atom(id);
    let used = mol.bond_order_sum(id) + atom.hydrogens() as usize;
    let has_room = atom.aromatic
        && atom
            .element
            .allowed_valences(atom.charge)
            .into_iter()
            .map(usize::from)
            .find(|&v| v >= used)
            .map_or(false, |target| target > used);
    used + has_room as usize
}

fn valence_warning(mol: &Molecule, id: AtomId) -> Option<ValenceWarning> {
    let atom = mol.atom(id);
    if atom.element.is_wildcard() {
        return None;
    }
    let allowed = atom.element.allowed_valences(atom.charge);
    let max = *allowed.iter().max()? as usize;
    let valence = mol.bond_order_sum(id) + atom.hydrogens() as usize;
    if valence <= max {
        return None;
    }
    Some(ValenceWarning {
        atom: id,
        element: atom.element,
        charge: atom.charge,
        valence,
        allowed,
    })
}

/// Marks every bond that lies on a cycle (is not a bridge), using an
/// iterative low-link DFS.
pub(crate) fn ring_bond_flags(mol: &Molecule) -> Vec<bool> {
    const UNSEEN: usize = usize::MAX;
    let n = mol.atom_count();
    let mut discovery = vec![UNSEEN; n];
    let mut low = vec![0; n];
    let mut is_bridge = vec![false; mol.bond_count()];
    let mut timer = 0;

    for root in mol.atoms() {
        if discovery[root.index()] != UNSEEN {
            continue;
        }
        discovery[root.index()] = timer;
        low[root.index()] = timer;
        timer += 1;

        let mut stack: Vec<(AtomId, Option<BondId>, Vec<(AtomId, BondId)>, usize)> =
            vec![(root, None, mol.bonds_of(root).collect(), 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let parent_bond = frame.1;
            if frame.3 < frame.2.len() {
                let (next, bond) = frame.2[frame.3];
                frame.3 += 1;
                if Some(bond) == parent_bond {
                    continue;
                }
                if discovery[next.index()] == UNSEEN {
                    discovery[next.index()] = timer;
                    low[next.index()] = timer;
                    timer += 1;
                    stack.push((next, Some(bond), mol.bonds_of(next).collect(), 0));
                } else {
                    low[node.index()] = low[node.index()].min(discovery[next.index()]);
                }
            } else {
                stack.pop();
                if let (Some(bond), Some(parent)) = (parent_bond, stack.last()) {
                    let parent = parent.0;
                    low[parent.index()] = low[parent.index()].min(low[node.index()]);
                    if low[node.index()] > discovery[parent.index()] {
                        is_bridge[bond.index()] = true;
                    }
                }
            }
        }
    }

    is_bridge.into_iter().map(|bridge| !bridge).collect()
}

/// Fills in implicit hydrogens and ring flags and validates valences.
///
/// # Arguments
///
/// * `mol` - The molecule to annotate in place.
/// * `options` - Whether valence problems are errors.
///
/// # Returns
///
/// * `Result<EnrichReport, ValenceError>` - The (possibly cached) report, or the
///   first valence violation when `options.strict` is set.
pub fn enrich(mol: &mut Molecule, options: &EnrichOptions) -> Result<EnrichReport, ValenceError> {
    if let Some((generation, report)) = &mol.enrichment {
        if *generation == mol.generation() {
            trace!("Enrichment cache hit at generation {generation}");
            report.check(options)?;
            return Ok(report.clone());
        }
    }

    let ring_bonds = ring_bond_flags(mol);
    let mut report = EnrichReport::default();

    let atoms: Vec<AtomId> = mol.atoms().collect();
    let hydrogens: Vec<u8> = atoms
        .iter()
        .map(|&id| {
            if mol.atom(id).is_bracket() {
                0
            } else {
                bare_hydrogens(mol, id)
            }
        })
        .collect();

    let bonds: Vec<BondId> = mol.bonds().collect();
    let mut ring_atoms = vec![false; atoms.len()];
    for &bond in &bonds {
        if ring_bonds[bond.index()] {
            if let Some((a, b)) = mol.bond_endpoints(bond) {
                ring_atoms[a.index()] = true;
                ring_atoms[b.index()] = true;
            }
        }
    }

    let graph = mol.graph_mut();
    for &bond in &bonds {
        graph[bond].in_ring = ring_bonds[bond.index()];
    }
    for &id in &atoms {
        let atom = &mut graph[id];
        atom.implicit_hydrogens = hydrogens[id.index()];
        atom.in_ring = ring_atoms[id.index()];
    }

    report.ring_atoms = ring_atoms.iter().filter(|&&r| r).count();
    report.ring_bonds = ring_bonds.iter().filter(|&&r| r).count();
    report.implicit_hydrogens = hydrogens.iter().map(|&h| h as usize).sum();
    report.warnings = atoms.iter().filter_map(|&id| valence_warning(mol, id)).collect();
    for warning in &report.warnings {
        warn!("Valence problem: {warning}");
    }
    debug!(
        "Enriched molecule: {} implicit H, {} ring atoms, {} ring bonds",
        report.implicit_hydrogens, report.ring_atoms, report.ring_bonds
    );

    mol.enrichment = Some((mol.generation(), report.clone()));
    report.check(options)?;
    Ok(report)
}

/// Enrich if the cached annotations are stale. Valence problems are ignored.
pub(crate) fn ensure_enriched(mol: &mut Molecule) {
    let current = matches!(&mol.enrichment, Some((generation, _)) if *generation == mol.generation());
    if !current {
        let _ = enrich(mol, &EnrichOptions::default());
    }
}

pub(crate) fn is_enriched(mol: &Molecule) -> bool {
    matches!(&mol.enrichment, Some((generation, _)) if *generation == mol.generation())
}

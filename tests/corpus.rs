use csv::{ReaderBuilder, StringRecord};
use molgraph::*;

struct CorpusEntry {
    smiles: String,
    name: String,
    rings: usize,
    aromatic_atoms: usize,
}

fn read_corpus() -> Vec<CorpusEntry> {
    let csv_data = include_str!("data/corpus.csv");
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());
    reader
        .records()
        .map(|result| {
            let record: StringRecord = result.expect("Error reading record");
            let field = |index: usize| record.get(index).unwrap_or("").trim().to_string();
            CorpusEntry {
                smiles: field(0),
                name: field(1),
                rings: field(2).parse().expect("ring count"),
                aromatic_atoms: field(3).parse().expect("aromatic atom count"),
            }
        })
        .collect()
}

fn prepared(entry: &CorpusEntry) -> (Molecule, Prepared) {
    let mut mol = parse_molecule(&entry.smiles).expect("Failed to parse corpus SMILES");
    let report = prepare(&mut mol, &EngineConfig::default()).expect("Failed to prepare");
    (mol, report)
}

#[test]
fn test_corpus_ring_counts() {
    for entry in read_corpus() {
        let (_, report) = prepared(&entry);
        assert!(report.rings.is_complete(), "{}: ring search truncated", entry.name);
        assert_eq!(report.rings.len(), entry.rings, "{}: ring count", entry.name);
    }
}

#[test]
fn test_corpus_aromatic_atoms() {
    for entry in read_corpus() {
        let (mol, _) = prepared(&entry);
        let aromatic = mol.atoms().filter(|&id| mol.atom(id).aromatic).count();
        assert_eq!(aromatic, entry.aromatic_atoms, "{}: aromatic atoms", entry.name);
    }
}

#[test]
fn test_corpus_canonical_stability() {
    for entry in read_corpus() {
        let first = canonical_smiles(&entry.smiles).expect("Failed to canonicalize");
        let second = canonical_smiles(&first).expect("Failed to canonicalize canonical form");
        assert_eq!(first, second, "{}: canonical form is not stable", entry.name);
    }
}

#[test]
fn test_corpus_round_trip() {
    for entry in read_corpus() {
        let (mol, _) = prepared(&entry);
        let written = generate(&mol, &WriteOptions::default()).expect("Failed to write");
        let reparsed = parse_molecule(&written).expect("Failed to re-parse written SMILES");
        assert_eq!(reparsed.atom_count(), mol.atom_count(), "{}: atom count", entry.name);
        assert_eq!(reparsed.bond_count(), mol.bond_count(), "{}: bond count", entry.name);
    }
}

/// Deterministic atom orders for `n` atoms: reversed, rotated and two shuffles.
fn atom_orders(n: usize) -> Vec<Vec<usize>> {
    let mut orders = vec![(0..n).rev().collect::<Vec<_>>(), (0..n).map(|i| (i + n / 2) % n).collect()];
    for seed in [7u64, 2024] {
        let mut order: Vec<usize> = (0..n).collect();
        let mut state = seed;
        for i in (1..n).rev() {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            order.swap(i, (state >> 33) as usize % (i + 1));
        }
        orders.push(order);
    }
    orders
}

/// Rebuild `mol` so that new atom `k` is old atom `order[k]`, adding bonds in reverse.
fn renumbered(mol: &Molecule, order: &[usize]) -> Molecule {
    let mut new_ids = vec![AtomId::new(0); order.len()];
    for (position, &old) in order.iter().enumerate() {
        new_ids[old] = AtomId::new(position);
    }
    let remap = |id: AtomId| new_ids[id.index()];

    let mut copy = Molecule::new();
    for &old in order {
        let mut atom = mol.atom(AtomId::new(old)).clone();
        if let Some(chirality) = atom.chirality.as_mut() {
            for neighbor in chirality.reference.iter_mut().flatten() {
                *neighbor = remap(*neighbor);
            }
        }
        copy.add_atom(atom);
    }
    let bonds: Vec<BondId> = mol.bonds().collect();
    for &id in bonds.iter().rev() {
        let (a, b) = mol.bond_endpoints(id).expect("Bond without endpoints");
        let mut bond = mol.bond(id).clone();
        if let Some(stereo) = bond.stereo.as_mut() {
            stereo.from = remap(stereo.from);
        }
        copy.add_bond(remap(b), remap(a), bond).expect("Failed to copy bond");
    }
    copy
}

fn canonical_forms(smiles: &str) -> Vec<String> {
    let parsed = parse_molecule(smiles).expect("Failed to parse SMILES");
    let mut forms = Vec::new();
    let identity: Vec<usize> = (0..parsed.atom_count()).collect();
    for order in std::iter::once(identity).chain(atom_orders(parsed.atom_count())) {
        let mut mol = renumbered(&parsed, &order);
        prepare(&mut mol, &EngineConfig::default()).expect("Failed to prepare");
        forms.push(generate(&mol, &WriteOptions::canonical()).expect("Failed to write canonical SMILES"));
    }
    forms
}

#[test]
fn test_canonical_form_ignores_atom_numbering() {
    let mut inputs: Vec<String> = read_corpus().into_iter().map(|entry| entry.smiles).collect();
    inputs.extend(
        ["F/C=C/F", "F/C=C\\F", "F\\C=C/F", "C(/F)=C/F", "N[C@@H](C)C(=O)O", "C[C@H](N)C(=O)O"]
            .iter()
            .map(|smiles| smiles.to_string()),
    );
    for smiles in &inputs {
        let forms = canonical_forms(smiles);
        assert!(forms.iter().all(|form| form == &forms[0]), "{smiles}: {forms:?}");
    }

    let cis = canonical_forms("F/C=C\\F");
    assert_eq!(cis[0], canonical_forms("F\\C=C/F")[0]);
    assert_ne!(cis[0], canonical_forms("F/C=C/F")[0]);
    assert_ne!(
        canonical_forms("OC1C2CC3CC1CC(C2)C3")[0],
        canonical_forms("OC12CC3CC(CC(C3)C1)C2")[0]
    );
}

//! A molecular graph engine: SMILES in and out, ring and aromaticity
//! perception, and SMARTS-style substructure search.
//!
//! ```
//! use molgraph::*;
//!
//! let mut mol = parse_molecule("C1=CC=CC=C1O").expect("valid SMILES");
//! prepare(&mut mol, EngineConfig::global()).expect("valid valences");
//! let phenol = compile_pattern("c[OH]").expect("valid pattern");
//! assert!(mol.has_match(&phenol));
//! assert_eq!(canonical_smiles("Oc1ccccc1").expect("valid SMILES"), canonical_smiles("c1ccccc1O").expect("valid SMILES"));
//! ```

use anyhow::{Context, Result};
use tracing::*;

mod element;
pub use element::*;

mod molecule;
pub use molecule::*;

mod parse;
pub use parse::*;

mod enrich;
pub use enrich::*;

mod rings;
pub use rings::*;

mod kekulize;
pub use kekulize::*;

mod aromaticity;
pub use aromaticity::*;

mod pattern;
pub use pattern::*;

mod canon;
pub use canon::*;

mod write;
pub use write::*;

mod config;
pub use config::*;

/// Install a `tracing` subscriber printing to stderr at `level`
/// (`"trace"`, `"debug"`, `"info"`, `"warn"` or `"error"`).
///
/// Unknown levels fall back to `info`. Only the first call has an effect.
pub fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

/// What [`prepare`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub enrichment: EnrichReport,
    pub rings: RingSet,
    pub aromaticity: AromaticityReport,
}

/// Enrich, perceive aromaticity and number the rings of `mol`.
///
/// # Arguments
///
/// * `mol` - The molecule to annotate in place.
/// * `config` - Options for each stage.
///
/// # Returns
///
/// * `Result<Prepared, ValenceError>` - The stage reports, or a valence error
///   when `config.enrich.strict` is set.
pub fn prepare(mol: &mut Molecule, config: &EngineConfig) -> std::result::Result<Prepared, ValenceError> {
    let enrichment = enrich(mol, &config.enrich)?;
    let aromaticity = perceive_aromaticity(mol, &config.aromaticity);
    let rings = find_rings(mol, &config.rings);
    debug!(
        "Prepared molecule: {} rings, {} aromatic atoms",
        rings.len(),
        aromaticity.aromatic_atoms
    );
    Ok(Prepared {
        enrichment,
        rings,
        aromaticity,
    })
}

/// Parse `smiles`, perceive aromaticity and write it back canonically.
///
/// Uses [`EngineConfig::global`] for every stage.
pub fn canonical_smiles(smiles: &str) -> Result<String> {
    let config = EngineConfig::global();
    let mut mol = parse_molecule(smiles).context(format!("Failed to parse SMILES string {smiles}"))?;
    prepare(&mut mol, config).context(format!("Failed to prepare {smiles}"))?;
    let options = config.write.clone().with_canonical(true);
    let canonical = generate(&mol, &options).context(format!("Failed to write canonical SMILES for {smiles}"))?;
    trace!("Canonical form of {smiles} is {canonical}");
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_benzene_forms() {
        for smiles in ["c1ccccc1", "C1=CC=CC=C1"] {
            let mut mol = parse_molecule(smiles).expect("Failed to parse SMILES");
            let prepared = prepare(&mut mol, &EngineConfig::default()).expect("Failed to prepare");
            assert_eq!(prepared.aromaticity.aromatic_atoms, 6);
            assert_eq!(prepared.rings.len(), 1);
            assert!(prepared.rings.iter().all(|ring| ring.aromatic));
        }
    }

    #[test]
    fn test_prepare_strict_valence() {
        let mut mol = parse_molecule("C(C)(C)(C)(C)C").expect("Failed to parse SMILES");
        let config = EngineConfig::default().with_enrich(EnrichOptions::strict());
        assert!(prepare(&mut mol, &config).is_err());

        let mut mol = parse_molecule("[CH255]C").expect("Failed to parse SMILES");
        let prepared = prepare(&mut mol, &EngineConfig::default()).expect("Failed to prepare");
        assert_eq!(prepared.enrichment.warnings.len(), 1);
        assert!(prepare(&mut mol, &config).is_err());
        assert_eq!(canonical_smiles("[CH255]C").expect("Failed to canonicalize"), "C[CH255]");
    }

    #[test]
    fn test_canonical_smiles() {
        init_logging("debug");
        let ethanol = canonical_smiles("OCC").expect("Failed to canonicalize");
        assert_eq!(ethanol, canonical_smiles("CCO").expect("Failed to canonicalize"));
        let error = canonical_smiles("C1CC").expect_err("unclosed ring");
        assert!(format!("{error:#}").contains("Failed to parse SMILES string C1CC"));
    }
}

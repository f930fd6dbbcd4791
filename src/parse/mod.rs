//! SMILES reading: the character-level scanner and the bracket atom grammar.

mod bracket;
pub use bracket::*;

mod smiles;
pub use smiles::*;

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use lazy_static::lazy_static;

/// Element symbols indexed by atomic number. Index 0 is the wildcard `*`.
const SYMBOLS: [&str; 119] = [
    "*", "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge",
    "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd",
    "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd",
    "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm",
    "Bk", "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn",
    "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

lazy_static! {
    static ref SYMBOL_LOOKUP: HashMap<&'static str, u8> = SYMBOLS
        .iter()
        .enumerate()
        .map(|(number, symbol)| (*symbol, number as u8))
        .collect();

    /// Standard valences used to derive implicit hydrogens and to validate
    /// bracket atoms. Elements without an entry are never validated.
    static ref DEFAULT_VALENCES: HashMap<u8, &'static [u8]> = {
        let mut table: HashMap<u8, &'static [u8]> = HashMap::new();
        table.insert(1, &[1]);
        table.insert(5, &[3]);
        table.insert(6, &[4]);
        table.insert(7, &[3, 5]);
        table.insert(8, &[2]);
        table.insert(9, &[1]);
        table.insert(14, &[4]);
        table.insert(15, &[3, 5]);
        table.insert(16, &[2, 4, 6]);
        table.insert(17, &[1]);
        table.insert(33, &[3, 5]);
        table.insert(34, &[2, 4, 6]);
        table.insert(35, &[1]);
        table.insert(52, &[2, 4, 6]);
        table.insert(53, &[1]);
        table
    };
}

/// A chemical element, identified by its atomic number.
///
/// Atomic number 0 is reserved for the `*` wildcard atom.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Element(u8);

#[allow(non_upper_case_globals)]
impl Element {
    pub const WILDCARD: Element = Element(0);
    pub const H: Element = Element(1);
    pub const B: Element = Element(5);
    pub const C: Element = Element(6);
    pub const N: Element = Element(7);
    pub const O: Element = Element(8);
    pub const F: Element = Element(9);
    pub const P: Element = Element(15);
    pub const S: Element = Element(16);
    pub const Cl: Element = Element(17);
    pub const Br: Element = Element(35);
    pub const I: Element = Element(53);

    /// Look up an element by atomic number.
    pub fn from_atomic_number(number: u8) -> Option<Self> {
        if (number as usize) < SYMBOLS.len() {
            Some(Element(number))
        } else {
            None
        }
    }

    /// Look up an element by its (capitalized) symbol, e.g. `"Cl"`.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        SYMBOL_LOOKUP.get(symbol).map(|&number| Element(number))
    }

    /// Look up an element written as an aromatic (lowercase) symbol.
    ///
    /// Only the elements that may legally appear aromatic are accepted.
    pub fn from_aromatic_symbol(symbol: &str) -> Option<Self> {
        let element = match symbol {
            "b" => Element::B,
            "c" => Element::C,
            "n" => Element::N,
            "o" => Element::O,
            "p" => Element::P,
            "s" => Element::S,
            "se" => Element(34),
            "as" => Element(33),
            "te" => Element(52),
            _ => return None,
        };
        Some(element)
    }

    pub fn atomic_number(&self) -> u8 {
        self.0
    }

    pub fn symbol(&self) -> &'static str {
        SYMBOLS[self.0 as usize]
    }

    /// The symbol written for an aromatic atom of this element.
    pub fn aromatic_symbol(&self) -> String {
        self.symbol().to_ascii_lowercase()
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == 0
    }

    pub fn is_carbon(&self) -> bool {
        self.0 == 6
    }

    pub fn is_hydrogen(&self) -> bool {
        self.0 == 1
    }

    /// Anything that is not carbon or hydrogen.
    pub fn is_hetero(&self) -> bool {
        !matches!(self.0, 0 | 1 | 6)
    }

    /// Members of the organic subset may be written without brackets.
    pub fn is_organic_subset(&self) -> bool {
        matches!(self.0, 0 | 5 | 6 | 7 | 8 | 9 | 15 | 16 | 17 | 35 | 53)
    }

    /// Elements that may be written as lowercase aromatic atoms.
    pub fn can_be_aromatic(&self) -> bool {
        matches!(self.0, 0 | 5 | 6 | 7 | 8 | 15 | 16 | 33 | 34 | 52)
    }

    /// Elements that can take part in a conjugated (sp2) ring system.
    pub fn is_sp2_capable(&self) -> bool {
        matches!(self.0, 0 | 5 | 6 | 7 | 8 | 15 | 16 | 33 | 34 | 52)
    }

    /// Default valence list for the neutral element.
    pub fn default_valences(&self) -> &'static [u8] {
        DEFAULT_VALENCES.get(&self.0).copied().unwrap_or(&[])
    }

    /// Valence list adjusted for a formal charge.
    ///
    /// Carbon and boron lose a bond per unit of charge, except that a boron
    /// anion behaves like carbon. Elements right of carbon behave like their
    /// isoelectronic neighbour (N+ like C, O- like F).
    pub fn allowed_valences(&self, charge: i8) -> Vec<u8> {
        let base = self.default_valences();
        if charge == 0 {
            return base.to_vec();
        }
        let shift: i16 = match self.0 {
            6 => -(charge.unsigned_abs() as i16),
            5 => -(charge as i16),
            _ => charge as i16,
        };
        base.iter()
            .map(|&v| v as i16 + shift)
            .filter(|&v| v >= 0)
            .map(|v| v as u8)
            .collect()
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.symbol())
    }
}

impl Debug for Element {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_lookup() {
        assert_eq!(Element::from_symbol("Cl"), Some(Element::Cl));
        assert_eq!(Element::from_symbol("C"), Some(Element::C));
        assert_eq!(Element::from_symbol("Xx"), None);
        assert_eq!(Element::from_atomic_number(26).map(|e| e.symbol()), Some("Fe"));
        assert_eq!(Element::from_aromatic_symbol("se").map(|e| e.atomic_number()), Some(34));
        assert_eq!(Element::from_aromatic_symbol("f"), None);
    }

    #[test]
    fn test_charge_adjusted_valences() {
        assert_eq!(Element::N.allowed_valences(1), vec![4, 6]);
        assert_eq!(Element::O.allowed_valences(-1), vec![1]);
        assert_eq!(Element::C.allowed_valences(-1), vec![3]);
        assert_eq!(Element::C.allowed_valences(1), vec![3]);
        assert_eq!(Element::B.allowed_valences(-1), vec![4]);
        assert!(Element::from_symbol("Fe").unwrap().allowed_valences(2).is_empty());
    }
}

use std::collections::BTreeMap;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{all_consuming, map, map_opt, opt, value},
    error::{Error as NomError, ErrorKind},
    multi::{many0, separated_list1},
    sequence::{pair, preceded, tuple},
    IResult,
};
use thiserror::Error;
use tracing::*;

use super::*;
use crate::parse::{charge, chirality, number, optional_number};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),
    #[error("Branch start '(' at position {0} without a current atom")]
    BranchNoCurrentAtom(usize),
    #[error("Branch end ')' at position {0} without a matching '('")]
    BranchEndNoStart(usize),
    #[error("Branch opened at position {0} is never closed")]
    UnclosedBranch(usize),
    #[error("Ring closure {0} at position {1} without a current atom")]
    RingClosureNoCurrentAtom(u16, usize),
    #[error("Ring closure {0} opened at position {1} is never closed")]
    UnclosedRing(u16, usize),
    #[error("Ring closure {0} at position {1} has conflicting bond expressions")]
    ConflictingRingBond(u16, usize),
    #[error("Ring closure {0} at position {1} bonds an atom to itself")]
    SelfRingClosure(u16, usize),
    #[error("Ring closure {0} at position {1} duplicates an existing bond")]
    DuplicateBond(u16, usize),
    #[error("Ring closure label after '%' at position {0} must be two digits")]
    InvalidRingLabel(usize),
    #[error("Unclosed bracket '[' at position {0}")]
    UnclosedBracket(usize),
    #[error("Invalid atom expression '[{0}]' at position {1}")]
    InvalidAtomExpression(String, usize),
    #[error("Invalid bond expression '{0}' at position {1}")]
    InvalidBondExpression(String, usize),
    #[error("Bond expression at position {0} is not followed by an atom")]
    DanglingBond(usize),
    #[error("Bond expression at position {0} does not follow an atom")]
    BondWithoutAtom(usize),
    #[error("Empty pattern")]
    EmptyPattern,
}

fn join_errors<E: ToString>(errors: &[E]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

/// Every error found while compiling a pattern. Never empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", join_errors(.0))]
pub struct PatternErrors(pub Vec<PatternError>);

impl PatternErrors {
    pub fn errors(&self) -> &[PatternError] {
        &self.0
    }

    pub fn first(&self) -> Option<&PatternError> {
        self.0.first()
    }
}

fn letter_error(input: &str) -> nom::Err<NomError<&str>> {
    nom::Err::Error(NomError::new(input, ErrorKind::Alpha))
}

/// Element symbols inside a bracket. A two-letter symbol wins unless its
/// second letter is `h` and the first letter is an element on its own, so
/// `[Nh]` reads as nitrogen with a hydrogen.
fn element_primitive(input: &str) -> IResult<&str, AtomPrimitive> {
    for symbol in ["se", "as", "te"] {
        if let Some(rest) = input.strip_prefix(symbol) {
            if let Some(element) = Element::from_aromatic_symbol(symbol) {
                let aromatic = Some(true);
                return Ok((rest, AtomPrimitive::Element { element, aromatic }));
            }
        }
    }

    let mut chars = input.chars();
    let first = chars.next().ok_or_else(|| letter_error(input))?;
    if first.is_ascii_lowercase() {
        return match "bcnops".contains(first).then(|| Element::from_aromatic_symbol(&input[..1])).flatten() {
            Some(element) => Ok((
                &input[1..],
                AtomPrimitive::Element {
                    element,
                    aromatic: Some(true),
                },
            )),
            None => Err(letter_error(input)),
        };
    }
    if !first.is_ascii_uppercase() {
        return Err(letter_error(input));
    }

    let single = match first {
        'D' | 'X' | 'R' | 'A' | 'H' => None,
        _ => Element::from_symbol(&input[..1]).filter(|e| !e.is_wildcard()),
    };
    if let Some(second) = chars.next().filter(|c| c.is_ascii_lowercase()) {
        if let Some(element) = Element::from_symbol(&input[..2]) {
            if !(second == 'h' && single.is_some()) {
                let aromatic = Some(false);
                return Ok((&input[2..], AtomPrimitive::Element { element, aromatic }));
            }
        }
    }
    match single {
        Some(element) => Ok((
            &input[1..],
            AtomPrimitive::Element {
                element,
                aromatic: Some(false),
            },
        )),
        None => Err(letter_error(input)),
    }
}

fn counted<'a>(
    letter: char,
    build: impl Fn(Option<u8>) -> AtomPrimitive,
) -> impl FnMut(&'a str) -> IResult<&'a str, AtomPrimitive> {
    map(preceded(char(letter), optional_number::<u8>), build)
}

fn atom_primitive(input: &str) -> IResult<&str, AtomPrimitive> {
    alt((
        map_opt(preceded(char('#'), number::<u8>), |n| {
            Element::from_atomic_number(n)
                .filter(|e| !e.is_wildcard())
                .map(|element| AtomPrimitive::Element {
                    element,
                    aromatic: None,
                })
        }),
        map(chirality, AtomPrimitive::Chirality),
        value(AtomPrimitive::Any, char('*')),
        element_primitive,
        counted('D', |n| AtomPrimitive::Degree(n.unwrap_or(1))),
        counted('X', |n| AtomPrimitive::Connectivity(n.unwrap_or(1))),
        counted('H', |n| AtomPrimitive::TotalHydrogens(n.unwrap_or(1))),
        counted('h', AtomPrimitive::ImplicitHydrogens),
        counted('R', AtomPrimitive::RingCount),
        counted('r', AtomPrimitive::RingSize),
        counted('x', AtomPrimitive::RingConnectivity),
        counted('v', |n| AtomPrimitive::Valence(n.unwrap_or(1))),
        value(AtomPrimitive::Aromatic, char('a')),
        value(AtomPrimitive::Aliphatic, char('A')),
        map(charge, AtomPrimitive::Charge),
        map(number::<u16>, AtomPrimitive::Isotope),
        map(preceded(char(':'), number::<u16>), AtomPrimitive::Class),
    ))(input)
}

fn atom_not(input: &str) -> IResult<&str, AtomExpr> {
    alt((
        map(preceded(char('!'), atom_not), |inner| AtomExpr::Not(Box::new(inner))),
        map(atom_primitive, AtomExpr::Primitive),
    ))(input)
}

/// `&` and juxtaposition bind tightest.
fn atom_high_and(input: &str) -> IResult<&str, AtomExpr> {
    map(pair(atom_not, many0(preceded(opt(char('&')), atom_not))), |(first, rest)| {
        AtomExpr::and(std::iter::once(first).chain(rest).collect())
    })(input)
}

fn atom_or(input: &str) -> IResult<&str, AtomExpr> {
    map(separated_list1(char(','), atom_high_and), AtomExpr::or)(input)
}

fn atom_low_and(input: &str) -> IResult<&str, AtomExpr> {
    map(separated_list1(char(';'), atom_or), AtomExpr::and)(input)
}

/// `[H]`, `[2H]`, `[H+]`: a leading `H` is the element, not a count.
fn hydrogen_atom(input: &str) -> IResult<&str, AtomExpr> {
    map(
        tuple((
            opt(number::<u16>),
            char('H'),
            opt(charge),
            opt(preceded(char(':'), number::<u16>)),
        )),
        |(isotope, _, charge, class)| {
            let mut terms = Vec::new();
            terms.extend(isotope.map(|i| AtomExpr::Primitive(AtomPrimitive::Isotope(i))));
            terms.push(AtomExpr::Primitive(AtomPrimitive::Element {
                element: Element::H,
                aromatic: Some(false),
            }));
            terms.extend(charge.map(|c| AtomExpr::Primitive(AtomPrimitive::Charge(c))));
            terms.extend(class.map(|c| AtomExpr::Primitive(AtomPrimitive::Class(c))));
            AtomExpr::and(terms)
        },
    )(input)
}

/// Parses the contents of a bracket atom expression.
pub fn parse_atom_expression(content: &str) -> Option<AtomExpr> {
    if let Ok((_, expr)) = all_consuming(hydrogen_atom)(content) {
        return Some(expr);
    }
    all_consuming(atom_low_and)(content).ok().map(|(_, expr)| expr)
}

fn bond_primitive(input: &str) -> IResult<&str, BondPrimitive> {
    alt((
        value(BondPrimitive::Single, char('-')),
        value(BondPrimitive::Double, char('=')),
        value(BondPrimitive::Triple, char('#')),
        value(BondPrimitive::Aromatic, char(':')),
        value(BondPrimitive::Any, char('~')),
        value(BondPrimitive::Ring, char('@')),
        value(BondPrimitive::Up, char('/')),
        value(BondPrimitive::Down, tag("\\")),
    ))(input)
}

fn bond_not(input: &str) -> IResult<&str, BondExpr> {
    alt((
        map(preceded(char('!'), bond_not), |inner| BondExpr::Not(Box::new(inner))),
        map(bond_primitive, BondExpr::Primitive),
    ))(input)
}

fn bond_high_and(input: &str) -> IResult<&str, BondExpr> {
    map(pair(bond_not, many0(preceded(opt(char('&')), bond_not))), |(first, rest)| {
        BondExpr::and(std::iter::once(first).chain(rest).collect())
    })(input)
}

fn bond_or(input: &str) -> IResult<&str, BondExpr> {
    map(separated_list1(char(','), bond_high_and), BondExpr::or)(input)
}

/// Parses a bond expression such as `=`, `-,:` or `!@`.
pub fn parse_bond_expression(text: &str) -> Option<BondExpr> {
    all_consuming(map(separated_list1(char(';'), bond_or), BondExpr::and))(text)
        .ok()
        .map(|(_, expr)| expr)
}

fn is_bond_char(c: char) -> bool {
    matches!(c, '-' | '=' | '#' | ':' | '~' | '@' | '/' | '\\' | '!' | '&' | ',' | ';')
}

struct RingOpening {
    atom: usize,
    bond: Option<BondExpr>,
    position: usize,
}

struct PatternCompiler {
    chars: Vec<char>,
    atoms: Vec<PatternAtom>,
    bonds: Vec<PatternBond>,
    current_atom: Option<usize>,
    pending_bond: Option<(BondExpr, usize)>,
    branch_stack: Vec<(usize, usize)>,
    ring_map: BTreeMap<u16, RingOpening>,
    errors: Vec<PatternError>,
}

impl PatternCompiler {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            atoms: Vec::new(),
            bonds: Vec::new(),
            current_atom: None,
            pending_bond: None,
            branch_stack: Vec::new(),
            ring_map: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    fn add_atom(&mut self, expr: AtomExpr) {
        let index = self.atoms.len();
        self.atoms.push(PatternAtom { expr });
        if let Some(previous) = self.current_atom {
            let expr = match self.pending_bond.take() {
                Some((expr, _)) => expr,
                None => BondExpr::implicit(),
            };
            self.bonds.push(PatternBond {
                begin: previous,
                end: index,
                expr,
                ring_closure: false,
            });
        }
        self.current_atom = Some(index);
    }

    fn flush_dangling(&mut self) {
        if let Some((_, position)) = self.pending_bond.take() {
            self.errors.push(PatternError::DanglingBond(position));
        }
    }

    fn ring_closure(&mut self, label: u16, position: usize) {
        let current = match self.current_atom {
            Some(atom) => atom,
            None => {
                self.errors.push(PatternError::RingClosureNoCurrentAtom(label, position));
                self.pending_bond = None;
                return;
            }
        };
        let closing_bond = self.pending_bond.take().map(|(expr, _)| expr);
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
                return;
            }
        };

        if opening.atom == current {
            self.errors.push(PatternError::SelfRingClosure(label, position));
            return;
        }
        let (a, b) = (opening.atom, current);
        if self
            .bonds
            .iter()
            .any(|bond| (bond.begin, bond.end) == (a, b) || (bond.begin, bond.end) == (b, a))
        {
            self.errors.push(PatternError::DuplicateBond(label, position));
            return;
        }
        let expr = match (opening.bond, closing_bond) {
            (Some(first), Some(second)) if first != second => {
                self.errors.push(PatternError::ConflictingRingBond(label, position));
                return;
            }
            (Some(expr), _) | (None, Some(expr)) => expr,
            (None, None) => BondExpr::implicit(),
        };
        self.bonds.push(PatternBond {
            begin: a,
            end: b,
            expr,
            ring_closure: true,
        });
    }

    fn bracket_atom(&mut self, i: usize) -> usize {
        let close = match self.chars[i + 1..].iter().position(|&c| c == ']') {
            Some(offset) => i + 1 + offset,
            None => {
                self.errors.push(PatternError::UnclosedBracket(i));
                return self.chars.len();
            }
        };
        let content: String = self.chars[i + 1..close].iter().collect();
        match parse_atom_expression(&content) {
            Some(expr) => self.add_atom(expr),
            None => {
                self.errors.push(PatternError::InvalidAtomExpression(content, i));
                self.pending_bond = None;
            }
        }
        close + 1
    }

    /// Unbracketed atoms: the organic subset, `*`, `a` and `A`.
    fn bare_atom(&mut self, i: usize) -> usize {
        let c = self.chars[i];
        let next = self.chars.get(i + 1).copied();
        let (primitive, width) = match (c, next) {
            ('C', Some('l')) => (
                AtomPrimitive::Element {
                    element: Element::Cl,
                    aromatic: Some(false),
                },
                2,
            ),
            ('B', Some('r')) => (
                AtomPrimitive::Element {
                    element: Element::Br,
                    aromatic: Some(false),
                },
                2,
            ),
            ('*', _) => (AtomPrimitive::Any, 1),
            ('a', _) => (AtomPrimitive::Aromatic, 1),
            ('A', _) => (AtomPrimitive::Aliphatic, 1),
            (c, _) => {
                let symbol = c.to_string();
                let element = if c.is_ascii_uppercase() {
                    Element::from_symbol(&symbol)
                        .filter(|e| e.is_organic_subset())
                        .map(|e| (e, false))
                } else {
                    Element::from_aromatic_symbol(&symbol).map(|e| (e, true))
                };
                match element {
                    Some((element, aromatic)) => (
                        AtomPrimitive::Element {
                            element,
                            aromatic: Some(aromatic),
                        },
                        1,
                    ),
                    None => {
                        self.errors.push(PatternError::UnexpectedCharacter(c, i));
                        self.pending_bond = None;
                        return i + 1;
                    }
                }
            }
        };
        self.add_atom(AtomExpr::Primitive(primitive));
        i + width
    }

    fn bond_expression(&mut self, i: usize) -> usize {
        let end = self.chars[i..]
            .iter()
            .position(|&c| !is_bond_char(c))
            .map_or(self.chars.len(), |offset| i + offset);
        let text: String = self.chars[i..end].iter().collect();
        if self.current_atom.is_none() {
            self.errors.push(PatternError::BondWithoutAtom(i));
        } else if self.pending_bond.is_some() {
            self.errors.push(PatternError::UnexpectedCharacter(self.chars[i], i));
        } else {
            match parse_bond_expression(&text) {
                Some(expr) => self.pending_bond = Some((expr, i)),
                None => self.errors.push(PatternError::InvalidBondExpression(text, i)),
            }
        }
        end
    }

    fn run(&mut self) {
        let mut i = 0;
        while i < self.chars.len() {
            let c = self.chars[i];
            match c {
                '(' => {
                    self.flush_dangling();
                    match self.current_atom {
                        Some(atom) => self.branch_stack.push((atom, i)),
                        None => self.errors.push(PatternError::BranchNoCurrentAtom(i)),
                    }
                    i += 1;
                }
                ')' => {
                    self.flush_dangling();
                    match self.branch_stack.pop() {
                        Some((atom, _)) => self.current_atom = Some(atom),
                        None => self.errors.push(PatternError::BranchEndNoStart(i)),
                    }
                    i += 1;
                }
                '.' => {
                    self.flush_dangling();
                    self.current_atom = None;
                    i += 1;
                }
                '%' => {
                    let label = match (self.chars.get(i + 1), self.chars.get(i + 2)) {
                        (Some(a), Some(b)) => a.to_digit(10).zip(b.to_digit(10)).map(|(a, b)| (a * 10 + b) as u16),
                        _ => None,
                    };
                    match label {
                        Some(label) => {
                            self.ring_closure(label, i);
                            i += 3;
                        }
                        None => {
                            self.errors.push(PatternError::InvalidRingLabel(i));
                            i += 1;
                        }
                    }
                }
                '0'..='9' => {
                    let label = c.to_digit(10).unwrap_or(0) as u16;
                    self.ring_closure(label, i);
                    i += 1;
                }
                '[' => i = self.bracket_atom(i),
                c if is_bond_char(c) => i = self.bond_expression(i),
                c if c.is_ascii_alphabetic() || c == '*' => i = self.bare_atom(i),
                c => {
                    self.errors.push(PatternError::UnexpectedCharacter(c, i));
                    i += 1;
                }
            }
        }

        self.flush_dangling();
        for &(_, position) in &self.branch_stack {
            self.errors.push(PatternError::UnclosedBranch(position));
        }
        for (label, opening) in &self.ring_map {
            self.errors.push(PatternError::UnclosedRing(*label, opening.position));
        }
    }
}

/// Compiles a SMARTS-style pattern.
///
/// # Arguments
///
/// * `text` - The pattern text, e.g. `"[#6]=O"` or `"c1ccccc1"`.
///
/// # Returns
///
/// * `Result<Pattern, PatternErrors>` - The compiled pattern, or every error
///   found in the text with its character position.
#[instrument(skip_all, fields(pattern = text))]
pub fn compile_pattern(text: &str) -> Result<Pattern, PatternErrors> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PatternErrors(vec![PatternError::EmptyPattern]));
    }
    let mut compiler = PatternCompiler::new(text);
    compiler.run();
    if !compiler.errors.is_empty() {
        debug!("Pattern rejected with {} error(s)", compiler.errors.len());
        return Err(PatternErrors(compiler.errors));
    }
    trace!("Compiled {} atoms and {} bonds", compiler.atoms.len(), compiler.bonds.len());
    Ok(Pattern::new(text, compiler.atoms, compiler.bonds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(element: Element, aromatic: Option<bool>) -> AtomExpr {
        AtomExpr::Primitive(AtomPrimitive::Element { element, aromatic })
    }

    fn first_error(text: &str) -> PatternError {
        compile_pattern(text).expect_err("expected an error").0.remove(0)
    }

    #[test]
    fn test_compile_simple_chain() {
        let pattern = compile_pattern("CC(=O)O").expect("Failed to compile");
        assert_eq!(pattern.atom_count(), 4);
        assert_eq!(pattern.bond_count(), 3);
        assert_eq!(pattern.atoms[0].expr, element(Element::C, Some(false)));
        assert_eq!(pattern.bonds[1].expr, BondExpr::Primitive(BondPrimitive::Double));
        assert_eq!(pattern.bonds[0].expr, BondExpr::implicit());
        assert_eq!(pattern.neighbors(1), vec![(0, 0), (2, 1), (3, 2)]);
    }

    #[test]
    fn test_compile_ring_closure() {
        let pattern = compile_pattern("c1ccccc1").expect("Failed to compile");
        assert_eq!(pattern.bond_count(), 6);
        assert!(pattern.bonds[5].ring_closure);
        assert_eq!((pattern.bonds[5].begin, pattern.bonds[5].end), (0, 5));
        assert_eq!(pattern.atoms[0].expr, element(Element::C, Some(true)));
    }

    #[test]
    fn test_atom_expression_precedence() {
        // `,` binds tighter than `;`, `&` tighter than `,`.
        let expr = parse_atom_expression("C,N;X3").expect("valid");
        assert_eq!(
            expr,
            AtomExpr::And(vec![
                AtomExpr::Or(vec![element(Element::C, Some(false)), element(Element::N, Some(false))]),
                AtomExpr::Primitive(AtomPrimitive::Connectivity(3)),
            ])
        );
        let expr = parse_atom_expression("C&H3,N").expect("valid");
        assert_eq!(
            expr,
            AtomExpr::Or(vec![
                AtomExpr::And(vec![
                    element(Element::C, Some(false)),
                    AtomExpr::Primitive(AtomPrimitive::TotalHydrogens(3)),
                ]),
                element(Element::N, Some(false)),
            ])
        );
        let expr = parse_atom_expression("!#1").expect("valid");
        assert_eq!(expr, AtomExpr::Not(Box::new(element(Element::H, None))));
    }

    #[test]
    fn test_atom_primitives() {
        assert_eq!(
            parse_atom_expression("OH"),
            Some(AtomExpr::And(vec![
                element(Element::O, Some(false)),
                AtomExpr::Primitive(AtomPrimitive::TotalHydrogens(1)),
            ]))
        );
        assert_eq!(
            parse_atom_expression("R"),
            Some(AtomExpr::Primitive(AtomPrimitive::RingCount(None)))
        );
        assert_eq!(
            parse_atom_expression("r6"),
            Some(AtomExpr::Primitive(AtomPrimitive::RingSize(Some(6))))
        );
        assert_eq!(
            parse_atom_expression("N+"),
            Some(AtomExpr::And(vec![
                element(Element::N, Some(false)),
                AtomExpr::Primitive(AtomPrimitive::Charge(1)),
            ]))
        );
        assert_eq!(parse_atom_expression("Cl"), Some(element(Element::Cl, Some(false))));
        assert_eq!(
            parse_atom_expression("Nh"),
            Some(AtomExpr::And(vec![
                element(Element::N, Some(false)),
                AtomExpr::Primitive(AtomPrimitive::ImplicitHydrogens(None)),
            ]))
        );
        assert_eq!(parse_atom_expression("H+"), Some(AtomExpr::And(vec![
            element(Element::H, Some(false)),
            AtomExpr::Primitive(AtomPrimitive::Charge(1)),
        ])));
        assert_eq!(parse_atom_expression("se"), Some(element(Element::from_aromatic_symbol("se").expect("se"), Some(true))));
        assert!(parse_atom_expression("C@@H").is_some());
        assert!(parse_atom_expression("$(CO)").is_none());
        assert!(parse_atom_expression("").is_none());
    }

    #[test]
    fn test_bond_expressions() {
        let pattern = compile_pattern("C!@C").expect("Failed to compile");
        assert_eq!(
            pattern.bonds[0].expr,
            BondExpr::Not(Box::new(BondExpr::Primitive(BondPrimitive::Ring)))
        );
        let pattern = compile_pattern("C-,:C").expect("Failed to compile");
        assert_eq!(pattern.bonds[0].expr, BondExpr::implicit());
        let pattern = compile_pattern("C~C").expect("Failed to compile");
        assert_eq!(pattern.bonds[0].expr, BondExpr::Primitive(BondPrimitive::Any));
    }

    #[test]
    fn test_disconnected_pattern() {
        let pattern = compile_pattern("C.C").expect("Failed to compile");
        assert_eq!(pattern.atom_count(), 2);
        assert_eq!(pattern.bond_count(), 0);
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(first_error(""), PatternError::EmptyPattern);
        assert_eq!(first_error("C1CC"), PatternError::UnclosedRing(1, 1));
        assert_eq!(first_error("C(C"), PatternError::UnclosedBranch(1));
        assert_eq!(first_error("C)C"), PatternError::BranchEndNoStart(1));
        assert_eq!(first_error("[C"), PatternError::UnclosedBracket(0));
        assert_eq!(first_error("C[Q]"), PatternError::InvalidAtomExpression("Q".to_string(), 1));
        assert_eq!(first_error("C=1CC#1"), PatternError::ConflictingRingBond(1, 6));
        assert_eq!(first_error("C="), PatternError::DanglingBond(1));
        assert_eq!(first_error("=C"), PatternError::BondWithoutAtom(0));
        assert_eq!(first_error("C=,C"), PatternError::InvalidBondExpression("=,".to_string(), 1));
        assert_eq!(first_error("C?"), PatternError::UnexpectedCharacter('?', 1));
        assert_eq!(first_error("C[D300]"), PatternError::InvalidAtomExpression("D300".to_string(), 1));
        assert_eq!(first_error("[C+300]"), PatternError::InvalidAtomExpression("C+300".to_string(), 0));
        let errors = compile_pattern("C(C[Q]C1").expect_err("invalid");
        assert_eq!(errors.errors().len(), 3);
        assert!("[#6]=O".parse::<Pattern>().is_ok());
    }
}

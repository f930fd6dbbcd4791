//! Bracket atom grammar: `[isotope? symbol chirality? hcount? charge? class?]`.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{all_consuming, cut, map, map_res, opt, value},
    error::{Error as NomError, ErrorKind},
    sequence::{preceded, tuple},
    IResult,
};

use crate::element::Element;
use crate::molecule::ChiralClass;

/// The parsed contents of a bracket atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketAtom {
    pub isotope: Option<u16>,
    pub element: Element,
    pub aromatic: bool,
    pub chirality: Option<ChiralClass>,
    pub hydrogens: u8,
    pub charge: i8,
    pub class: Option<u16>,
}

pub(crate) fn number<T: std::str::FromStr>(input: &str) -> IResult<&str, T> {
    map_res(digit1, |digits: &str| digits.parse::<T>())(input)
}

/// An optional count. Digits that are present but do not fit in `T` fail the
/// whole parse instead of leaving the count out.
pub(crate) fn optional_number<T: std::str::FromStr>(input: &str) -> IResult<&str, Option<T>> {
    if digit1::<&str, NomError<&str>>(input).is_err() {
        return Ok((input, None));
    }
    map(cut(number::<T>), Some)(input)
}

fn symbol_error(input: &str) -> nom::Err<NomError<&str>> {
    nom::Err::Error(NomError::new(input, ErrorKind::Alpha))
}

/// Parses an element symbol. Two-letter symbols win over one-letter ones.
pub(crate) fn element_symbol(input: &str) -> IResult<&str, (Element, bool)> {
    if let Some(rest) = input.strip_prefix('*') {
        return Ok((rest, (Element::WILDCARD, false)));
    }
    for aromatic in ["se", "as", "te"] {
        if let Some(rest) = input.strip_prefix(aromatic) {
            if let Some(element) = Element::from_aromatic_symbol(aromatic) {
                return Ok((rest, (element, true)));
            }
        }
    }

    let mut chars = input.char_indices();
    let first = match chars.next() {
        Some((_, c)) => c,
        None => return Err(symbol_error(input)),
    };

    if first.is_ascii_lowercase() {
        let symbol = &input[..1];
        return match Element::from_aromatic_symbol(symbol) {
            Some(element) => Ok((&input[1..], (element, true))),
            None => Err(symbol_error(input)),
        };
    }

    if !first.is_ascii_uppercase() {
        return Err(symbol_error(input));
    }

    if let Some((_, second)) = chars.next() {
        if second.is_ascii_lowercase() {
            if let Some(element) = Element::from_symbol(&input[..2]) {
                return Ok((&input[2..], (element, false)));
            }
        }
    }
    match Element::from_symbol(&input[..1]) {
        Some(element) => Ok((&input[1..], (element, false))),
        None => Err(symbol_error(input)),
    }
}

pub(crate) fn chirality(input: &str) -> IResult<&str, ChiralClass> {
    alt((
        value(ChiralClass::Anticlockwise, tag("@TH1")),
        value(ChiralClass::Clockwise, tag("@TH2")),
        value(ChiralClass::Clockwise, tag("@@")),
        value(ChiralClass::Anticlockwise, tag("@")),
    ))(input)
}

fn hydrogen_count(input: &str) -> IResult<&str, u8> {
    map(preceded(char('H'), optional_number::<u8>), |count| count.unwrap_or(1))(input)
}

/// Parses a charge: `+`, `-`, `++`, `--`, `+n` or `-n`.
pub(crate) fn charge(input: &str) -> IResult<&str, i8> {
    alt((
        value(2, tag("++")),
        value(-2, tag("--")),
        map(preceded(char('+'), optional_number::<i8>), |n| n.unwrap_or(1)),
        map(preceded(char('-'), optional_number::<i8>), |n: Option<i8>| -n.unwrap_or(1)),
    ))(input)
}

fn atom_class(input: &str) -> IResult<&str, u16> {
    preceded(char(':'), number::<u16>)(input)
}

fn bracket_atom(input: &str) -> IResult<&str, BracketAtom> {
    map(
        tuple((
            opt(number::<u16>),
            element_symbol,
            opt(chirality),
            opt(hydrogen_count),
            opt(charge),
            opt(atom_class),
        )),
        |(isotope, (element, aromatic), chirality, hydrogens, charge, class)| BracketAtom {
            isotope,
            element,
            aromatic,
            chirality,
            hydrogens: hydrogens.unwrap_or(0),
            charge: charge.unwrap_or(0),
            class,
        },
    )(input)
}

/// Parse the text between `[` and `]`.
pub fn parse_bracket_atom(content: &str) -> Option<BracketAtom> {
    all_consuming(bracket_atom)(content)
        .ok()
        .map(|(_, atom)| atom)
        .filter(|atom| !atom.aromatic || atom.element.can_be_aromatic())
}

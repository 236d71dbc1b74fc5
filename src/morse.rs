use crate::error::DahditError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MorseSymbol {
    Dot,
    Dash,
}

impl MorseSymbol {
    pub fn as_char(&self) -> char {
        match self {
            MorseSymbol::Dot => '.',
            MorseSymbol::Dash => '-',
        }
    }
}

use MorseSymbol::{Dash as H, Dot as I};

const LETTERS: [char; 26] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

const ALPHANUMERICS: [char; 36] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Static International Morse table for letters and digits
pub struct MorseTable;

impl MorseTable {
    /// Symbol sequence for `c`, case-insensitive
    pub fn lookup(c: char) -> Result<&'static [MorseSymbol], DahditError> {
        let symbols: &'static [MorseSymbol] = match c.to_ascii_uppercase() {
            'A' => &[I, H],
            'B' => &[H, I, I, I],
            'C' => &[H, I, H, I],
            'D' => &[H, I, I],
            'E' => &[I],
            'F' => &[I, I, H, I],
            'G' => &[H, H, I],
            'H' => &[I, I, I, I],
            'I' => &[I, I],
            'J' => &[I, H, H, H],
            'K' => &[H, I, H],
            'L' => &[I, H, I, I],
            'M' => &[H, H],
            'N' => &[H, I],
            'O' => &[H, H, H],
            'P' => &[I, H, H, I],
            'Q' => &[H, H, I, H],
            'R' => &[I, H, I],
            'S' => &[I, I, I],
            'T' => &[H],
            'U' => &[I, I, H],
            'V' => &[I, I, I, H],
            'W' => &[I, H, H],
            'X' => &[H, I, I, H],
            'Y' => &[H, I, H, H],
            'Z' => &[H, H, I, I],
            '0' => &[H, H, H, H, H],
            '1' => &[I, H, H, H, H],
            '2' => &[I, I, H, H, H],
            '3' => &[I, I, I, H, H],
            '4' => &[I, I, I, I, H],
            '5' => &[I, I, I, I, I],
            '6' => &[H, I, I, I, I],
            '7' => &[H, H, I, I, I],
            '8' => &[H, H, H, I, I],
            '9' => &[H, H, H, H, I],
            _ => return Err(DahditError::UnknownCharacter(c)),
        };
        Ok(symbols)
    }

    pub fn contains(c: char) -> bool {
        Self::lookup(c).is_ok()
    }

    pub fn letters() -> &'static [char] {
        &LETTERS
    }

    pub fn alphanumerics() -> &'static [char] {
        &ALPHANUMERICS
    }

    /// Dot/dash text such as `.-` for display
    pub fn pattern(c: char) -> Result<String, DahditError> {
        Ok(Self::lookup(c)?.iter().map(MorseSymbol::as_char).collect())
    }
}

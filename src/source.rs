use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::morse::MorseTable;

/// Picks the character for each new round
pub trait CharacterSource {
    fn next(&mut self) -> char;
}

/// Uniform draw over a character domain, repeats allowed
pub struct RandomSource {
    domain: Vec<char>,
    rng: StdRng,
}

impl RandomSource {
    pub fn new(domain: &[char]) -> Self {
        Self::with_rng(domain, StdRng::from_entropy())
    }

    pub fn seeded(domain: &[char], seed: u64) -> Self {
        Self::with_rng(domain, StdRng::seed_from_u64(seed))
    }

    fn with_rng(domain: &[char], rng: StdRng) -> Self {
        let domain = if domain.is_empty() {
            MorseTable::letters().to_vec()
        } else {
            domain.to_vec()
        };
        Self { domain, rng }
    }

    pub fn letters() -> Self {
        Self::new(MorseTable::letters())
    }

    pub fn alphanumerics() -> Self {
        Self::new(MorseTable::alphanumerics())
    }

    pub fn domain(&self) -> &[char] {
        &self.domain
    }
}

impl CharacterSource for RandomSource {
    fn next(&mut self) -> char {
        // domain is never empty, see with_rng
        *self.domain.choose(&mut self.rng).unwrap_or(&'E')
    }
}

/// Replays a fixed sequence, cycling when exhausted
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    script: VecDeque<char>,
}

impl ScriptedSource {
    pub fn new(chars: &str) -> Self {
        let script: VecDeque<char> = chars.chars().collect();
        Self { script }
    }
}

impl CharacterSource for ScriptedSource {
    fn next(&mut self) -> char {
        match self.script.pop_front() {
            Some(c) => {
                self.script.push_back(c);
                c
            }
            None => 'E',
        }
    }
}

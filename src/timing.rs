use std::time::Duration;

use crate::error::DahditError;
use crate::morse::MorseSymbol;

/// Milliseconds per unit at 1 wpm: PARIS is 50 units per word
const PARIS_MS_PER_WPM: f64 = 1200.0;

/// Absolute element durations for one speed.
///
/// Every duration the trainer uses, audible or visual, comes from here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    wpm: f64,
}

impl Timing {
    pub fn derive(wpm: f64) -> Result<Self, DahditError> {
        if !wpm.is_finite() || wpm <= 0.0 {
            return Err(DahditError::InvalidSpeed(wpm));
        }
        Ok(Self { wpm })
    }

    pub fn wpm(&self) -> f64 {
        self.wpm
    }

    pub fn unit_ms(&self) -> f64 {
        PARIS_MS_PER_WPM / self.wpm
    }

    pub fn dot_ms(&self) -> f64 {
        self.unit_ms()
    }

    pub fn dash_ms(&self) -> f64 {
        3.0 * self.unit_ms()
    }

    pub fn intra_gap_ms(&self) -> f64 {
        self.unit_ms()
    }

    pub fn inter_gap_ms(&self) -> f64 {
        3.0 * self.unit_ms()
    }

    pub fn symbol_ms(&self, symbol: MorseSymbol) -> f64 {
        match symbol {
            MorseSymbol::Dot => self.dot_ms(),
            MorseSymbol::Dash => self.dash_ms(),
        }
    }

    /// Tones plus intra-character gaps, no trailing gap
    pub fn character_ms(&self, symbols: &[MorseSymbol]) -> f64 {
        let tones: f64 = symbols.iter().map(|&s| self.symbol_ms(s)).sum();
        let gaps = symbols.len().saturating_sub(1) as f64 * self.intra_gap_ms();
        tones + gaps
    }

    pub fn inter_gap(&self) -> Duration {
        Duration::from_secs_f64(self.inter_gap_ms() / 1000.0)
    }

    pub fn symbol_duration(&self, symbol: MorseSymbol) -> Duration {
        Duration::from_secs_f64(self.symbol_ms(symbol) / 1000.0)
    }

    pub fn character_duration(&self, symbols: &[MorseSymbol]) -> Duration {
        Duration::from_secs_f64(self.character_ms(symbols) / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morse::MorseTable;

    #[test]
    fn test_paris_unit() {
        let t = Timing::derive(20.0).unwrap();
        assert_eq!(t.unit_ms(), 60.0);
        assert_eq!(t.dot_ms(), 60.0);
        assert_eq!(t.dash_ms(), 180.0);
        assert_eq!(t.intra_gap_ms(), 60.0);
        assert_eq!(t.inter_gap_ms(), 180.0);
    }

    #[test]
    fn test_dash_is_three_dots_for_many_speeds() {
        for wpm in [1.0, 5.0, 12.0, 13.0, 18.5, 20.0, 35.0, 60.0] {
            let t = Timing::derive(wpm).unwrap();
            assert_eq!(t.unit_ms(), 1200.0 / wpm);
            assert_eq!(t.dash_ms(), 3.0 * t.dot_ms());
        }
    }

    #[test]
    fn test_invalid_speed() {
        assert_eq!(Timing::derive(0.0), Err(DahditError::InvalidSpeed(0.0)));
        assert_eq!(Timing::derive(-5.0), Err(DahditError::InvalidSpeed(-5.0)));
        assert!(Timing::derive(f64::NAN).is_err());
        assert!(Timing::derive(f64::INFINITY).is_err());
    }

    #[test]
    fn test_character_duration() {
        let t = Timing::derive(20.0).unwrap();
        let a = MorseTable::lookup('A').unwrap();
        assert_eq!(t.character_ms(a), 300.0);
        assert_eq!(t.character_ms(&[]), 0.0);

        let t12 = Timing::derive(12.0).unwrap();
        let s = MorseTable::lookup('S').unwrap();
        assert_eq!(t12.character_duration(s), Duration::from_millis(500));
        assert_eq!(t12.symbol_duration(MorseSymbol::Dot), Duration::from_millis(100));
        let t4 = Timing::derive(4.0).unwrap();
        assert_eq!(t4.symbol_duration(MorseSymbol::Dash), Duration::from_millis(900));
    }
}

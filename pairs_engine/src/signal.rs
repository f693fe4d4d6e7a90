/// signal.rs - Threshold-crossing position state machine
///
/// ─────────────────────────────────────────────────────────────────────────
/// STATE MACHINE
/// ─────────────────────────────────────────────────────────────────────────
///
///   prev   | condition on z_t      | next
///   -------+-----------------------+------
///   Flat   | z_t <= −open          | Long
///   Flat   | z_t >= +open          | Short
///   Flat   | otherwise             | Flat
///   Long   | z_t >= +close         | Flat
///   Long   | otherwise             | Long
///   Short  | z_t <= −close         | Flat
///   Short  | otherwise             | Short
///
///   t = 0 uses the Flat row (there is no previous position).
///
///   Entry band is wide (e.g. 2σ) and exit band narrow (e.g. 0σ), so a
///   position is held until the spread has reverted through the inner
///   threshold instead of flip-flopping around the outer one.  A position
///   never flips sign in a single step; it always passes through Flat.
/// ─────────────────────────────────────────────────────────────────────────
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PairsError, Result};
use crate::series::TimeSeries;

/// Synthetic pair position held at a time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Short,
    Flat,
    Long,
}

impl Position {
    /// −1 / 0 / +1
    pub fn as_i8(self) -> i8 {
        match self {
            Position::Short => -1,
            Position::Flat => 0,
            Position::Long => 1,
        }
    }

    pub fn is_open(self) -> bool {
        self != Position::Flat
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Position::Short => "SHORT",
            Position::Flat => "FLAT",
            Position::Long => "LONG",
        })
    }
}

/// Symmetric entry/exit band, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    open:  f64,
    close: f64,
}

impl Thresholds {
    pub fn new(open: f64, close: f64) -> Result<Self> {
        let valid = open.is_finite() && close.is_finite() && close >= 0.0 && close <= open;
        if !valid {
            return Err(PairsError::InvalidThresholds { open, close });
        }
        Ok(Self { open, close })
    }

    pub fn open(&self) -> f64 {
        self.open
    }

    pub fn close(&self) -> f64 {
        self.close
    }

    /// Transition function for one step.
    ///
    /// When `open = 0` and `z = 0` both entry conditions hold; Long wins
    /// because it is tested first.
    pub fn step(&self, prev: Position, z: f64) -> Position {
        match prev {
            Position::Flat if z <= -self.open => Position::Long,
            Position::Flat if z >= self.open => Position::Short,
            Position::Flat => Position::Flat,
            Position::Long if z >= self.close => Position::Flat,
            Position::Long => Position::Long,
            Position::Short if z <= -self.close => Position::Flat,
            Position::Short => Position::Short,
        }
    }
}

impl Default for Thresholds {
    /// Open at 2σ, close at the mean.
    fn default() -> Self {
        Self { open: 2.0, close: 0.0 }
    }
}

/// Turn a z-score series into a position series.
///
/// The output has the z-score's index.  Every z value is checked before the
/// fold starts: one NaN would otherwise corrupt all later states.
pub fn generate_signal(
    zscore:     &TimeSeries<f64>,
    thresholds: &Thresholds,
) -> Result<TimeSeries<Position>> {
    if zscore.is_empty() {
        return Err(PairsError::EmptyInput { what: "z-score series" });
    }
    zscore.ensure_finite("z-score")?;

    let positions: Vec<Position> = zscore
        .values()
        .iter()
        .scan(Position::Flat, |prev, &z| {
            *prev = thresholds.step(*prev, z);
            Some(*prev)
        })
        .collect();

    zscore.with_values(positions)
}

/// Convenience wrapper taking raw threshold values.
pub fn position_signal(zscore: &TimeSeries<f64>, open: f64, close: f64) -> Result<TimeSeries<Position>> {
    let thresholds = Thresholds::new(open, close)?;
    generate_signal(zscore, &thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::series;
    use Position::{Flat, Long, Short};

    fn run(z: &[f64], open: f64, close: f64) -> Vec<Position> {
        position_signal(&series(z), open, close).unwrap().values().to_vec()
    }

    #[test]
    fn short_closes_when_z_reaches_minus_close() {
        // Short exits on z <= -close; with close = 0, z = -3 qualifies.
        assert_eq!(run(&[3.0, 3.0, -3.0, 0.0, 0.0], 2.0, 0.0), vec![Short, Short, Flat, Flat, Flat]);
    }

    #[test]
    fn initial_state_uses_open_rule() {
        assert_eq!(run(&[-2.0], 2.0, 0.0), vec![Long]);
        assert_eq!(run(&[2.0], 2.0, 0.0), vec![Short]);
        assert_eq!(run(&[1.99], 2.0, 0.0), vec![Flat]);
    }

    #[test]
    fn long_holds_inside_band_and_closes_at_close_threshold() {
        let z = [-2.5, -1.0, -0.1, 0.5, 0.49, 0.6];
        assert_eq!(run(&z, 2.0, 0.5), vec![Long, Long, Long, Flat, Flat, Flat]);
    }

    #[test]
    fn flat_row_can_reopen_next_step() {
        // Close then re-open in the next step when z is beyond the open band.
        assert_eq!(run(&[2.1, -0.5, 2.2], 2.0, 0.0), vec![Short, Flat, Short]);
    }

    #[test]
    fn zero_thresholds_open_and_close_on_sign() {
        let z = [0.5, -0.5, 0.0, 0.0, -0.1, 0.0];
        // t0 Short (0.5 >= 0), t1 closes (-0.5 <= 0), t2 Long (0 <= -0 checked first),
        // t3 Long closes on z = 0 >= 0, t4 Long, t5 closes on z = 0.
        assert_eq!(run(&z, 0.0, 0.0), vec![Short, Flat, Long, Flat, Long, Flat]);
    }

    #[test]
    fn boundary_values_are_inclusive() {
        assert_eq!(run(&[-2.0, 0.0], 2.0, 0.0), vec![Long, Flat]);
        assert_eq!(run(&[2.0, -0.0], 2.0, 0.0), vec![Short, Flat]);
    }

    #[test]
    fn never_flips_sign_without_flat() {
        let z: Vec<f64> = (0..400).map(|i| 3.0 * ((i as f64) * 0.37).sin() + ((i * 7 % 11) as f64 - 5.0) * 0.3).collect();
        for (open, close) in [(2.0, 0.0), (1.0, 0.5), (0.0, 0.0), (1.5, 1.5)] {
            let sig = run(&z, open, close);
            for w in sig.windows(2) {
                assert!(
                    !(w[0] == Long && w[1] == Short) && !(w[0] == Short && w[1] == Long),
                    "direct flip with open={open} close={close}"
                );
            }
        }
    }

    #[test]
    fn preserves_index_and_is_deterministic() {
        let z = series(&[0.0, 2.5, 1.0, -0.2, -2.4, -1.0, 0.3]);
        let a = generate_signal(&z, &Thresholds::default()).unwrap();
        let b = generate_signal(&z, &Thresholds::default()).unwrap();
        assert_eq!(a.index(), z.index());
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_close_above_open() {
        let err = position_signal(&series(&[0.0]), 1.0, 1.5).unwrap_err();
        assert!(matches!(err, PairsError::InvalidThresholds { .. }));
    }

    #[test]
    fn rejects_negative_threshold() {
        assert!(Thresholds::new(1.0, -0.1).is_err());
        assert!(Thresholds::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn rejects_empty_input() {
        let err = generate_signal(&TimeSeries::empty(), &Thresholds::default()).unwrap_err();
        assert!(matches!(err, PairsError::EmptyInput { .. }));
    }

    #[test]
    fn rejects_non_finite_z() {
        let err = position_signal(&series(&[0.0, f64::INFINITY, 0.0]), 2.0, 0.0).unwrap_err();
        assert!(matches!(err, PairsError::UndefinedValue { index: 1, .. }));
    }

    #[test]
    fn position_codes() {
        let codes: Vec<i8> = [Short, Flat, Long].iter().map(|p| p.as_i8()).collect();
        assert_eq!(codes, vec![-1, 0, 1]);
        assert!(Long.is_open() && Short.is_open() && !Flat.is_open());
    }
}

//! Pair invariant: the account holds nothing, or exactly one long and one short.

use crate::exchange::{count_directions, Position};
use serde::Serialize;
use std::fmt;

/// Shape of an observed position set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "shape")]
pub enum PairShape {
    Empty,
    /// Exactly one long and one short
    Balanced,
    /// Anything else; requires full liquidation
    Broken { long: usize, short: usize },
}

impl PairShape {
    pub fn of(positions: &[Position]) -> Self {
        match count_directions(positions) {
            (0, 0) => PairShape::Empty,
            (1, 1) => PairShape::Balanced,
            (long, short) => PairShape::Broken { long, short },
        }
    }
}

impl fmt::Display for PairShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairShape::Empty => write!(f, "0L + 0S"),
            PairShape::Balanced => write!(f, "1L + 1S"),
            PairShape::Broken { long, short } => write!(f, "{}L + {}S", long, short),
        }
    }
}

/// Anomaly seen while holding a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum PairAnomaly {
    /// Position count differs from the expected count
    CountMismatch {
        expected: usize,
        found: usize,
        long: usize,
        short: usize,
    },
    /// Right count, wrong long/short split
    SplitMismatch { long: usize, short: usize },
}

impl PairAnomaly {
    /// Check a position set against the expected count.
    ///
    /// A split is only judged when there are exactly two positions.
    pub fn detect(positions: &[Position], expected: usize) -> Option<Self> {
        let (long, short) = count_directions(positions);
        let found = positions.len();

        if found != expected {
            return Some(PairAnomaly::CountMismatch {
                expected,
                found,
                long,
                short,
            });
        }
        if found == 2 && (long != 1 || short != 1) {
            return Some(PairAnomaly::SplitMismatch { long, short });
        }
        None
    }

    /// Human description for the log line.
    pub fn describe(&self) -> &'static str {
        match self {
            PairAnomaly::CountMismatch { found: 0, .. } => "positions were closed prematurely",
            PairAnomaly::CountMismatch { found: 1, .. } => "delta neutrality lost, single leg open",
            PairAnomaly::CountMismatch { found, expected, .. } if found > expected => {
                "more positions open than expected"
            }
            PairAnomaly::CountMismatch { .. } => "fewer positions open than expected",
            PairAnomaly::SplitMismatch { .. } => "long/short ratio is not 1:1",
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::exchange::{Direction, Position};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub fn position(trade_index: u32, direction: Direction) -> Position {
        Position {
            pair_index: 1,
            trade_index,
            collateral: dec!(50),
            direction,
            leverage: dec!(10),
            open_price: dec!(3000),
            take_profit: None,
            stop_loss: None,
            liquidation_price: dec!(2700),
            margin_fee: Decimal::ZERO,
        }
    }

    pub fn pair() -> Vec<Position> {
        vec![position(0, Direction::Long), position(1, Direction::Short)]
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::exchange::Direction;

    #[test]
    fn test_shape_classification() {
        assert_eq!(PairShape::of(&[]), PairShape::Empty);
        assert_eq!(PairShape::of(&pair()), PairShape::Balanced);
        assert_eq!(
            PairShape::of(&[position(0, Direction::Long), position(1, Direction::Long)]),
            PairShape::Broken { long: 2, short: 0 }
        );
        assert_eq!(
            PairShape::of(&[position(0, Direction::Short)]),
            PairShape::Broken { long: 0, short: 1 }
        );
    }

    #[test]
    fn test_anomaly_detection() {
        assert_eq!(PairAnomaly::detect(&pair(), 2), None);

        let single = vec![position(0, Direction::Long)];
        let anomaly = PairAnomaly::detect(&single, 2).unwrap();
        assert!(matches!(anomaly, PairAnomaly::CountMismatch { found: 1, .. }));
        assert_eq!(anomaly.describe(), "delta neutrality lost, single leg open");

        let two_shorts = vec![position(0, Direction::Short), position(1, Direction::Short)];
        assert_eq!(
            PairAnomaly::detect(&two_shorts, 2),
            Some(PairAnomaly::SplitMismatch { long: 0, short: 2 })
        );

        let mut three = pair();
        three.push(position(2, Direction::Long));
        assert_eq!(
            PairAnomaly::detect(&three, 2).map(|a| a.describe()),
            Some("more positions open than expected")
        );
    }
}

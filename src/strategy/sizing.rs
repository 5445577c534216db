//! Pair sizing.

use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Smallest leg the splitter will ever emit.
const LEG_FLOOR_USD: Decimal = dec!(1);

/// Resolution of the noise draw (1e-4).
const NOISE_STEPS: i64 = 10_000;

/// Collateral of the two legs of a pair, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegSizes {
    pub long: Decimal,
    pub short: Decimal,
}

impl LegSizes {
    pub fn total(&self) -> Decimal {
        self.long + self.short
    }

    /// True when either leg is below `minimum`.
    pub fn below(&self, minimum: Decimal) -> bool {
        self.long < minimum || self.short < minimum
    }
}

/// Split `total` into a long and a short leg.
///
/// With zero noise both legs are exactly half. Otherwise the long leg is
/// shifted by up to `noise` of a half, uniformly in either direction, and
/// the short leg takes the remainder. Each leg is floored at $1.
pub fn split_order_value<R: Rng>(total: Decimal, noise: Decimal, rng: &mut R) -> LegSizes {
    let half = total / dec!(2);

    let (long, short) = if noise > Decimal::ZERO {
        let draw = Decimal::new(rng.random_range(-NOISE_STEPS..=NOISE_STEPS), 4);
        let long = half + half * noise * draw;
        (long, total - long)
    } else {
        (half, half)
    };

    LegSizes {
        long: long.max(LEG_FLOOR_USD),
        short: short.max(LEG_FLOOR_USD),
    }
}

/// Largest pair notional the account supports.
///
/// The configured maximum is used unless it implies more leverage on the
/// balance than `max_leverage`, in which case `balance × max_leverage`.
/// Returns zero for a non-positive balance.
pub fn max_order_value(configured_max: Decimal, balance: Decimal, max_leverage: u32) -> Decimal {
    if balance <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let leverage = Decimal::from(max_leverage);
    if configured_max / balance > leverage {
        balance * leverage
    } else {
        configured_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split_without_noise() {
        let sizes = split_order_value(dec!(100), Decimal::ZERO, &mut rand::rng());
        assert_eq!(sizes.long, dec!(50.0));
        assert_eq!(sizes.short, dec!(50.0));
    }

    #[test]
    fn test_noise_preserves_total_and_bounds() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let sizes = split_order_value(dec!(100), dec!(0.2), &mut rng);
            assert_eq!(sizes.total(), dec!(100));
            assert!(sizes.long >= dec!(40) && sizes.long <= dec!(60), "{:?}", sizes);
        }
    }

    #[test]
    fn test_legs_floored_at_one_dollar() {
        let sizes = split_order_value(dec!(1), Decimal::ZERO, &mut rand::rng());
        assert_eq!(sizes.long, dec!(1));
        assert_eq!(sizes.short, dec!(1));
        assert!(sizes.below(dec!(10)));
    }

    #[test]
    fn test_max_order_value_caps_by_leverage() {
        // 400 / 20 = 20x > 10x
        assert_eq!(max_order_value(dec!(400), dec!(20), 10), dec!(200));
        // 40 / 20 = 2x
        assert_eq!(max_order_value(dec!(40), dec!(20), 10), dec!(40));
        assert_eq!(max_order_value(dec!(40), Decimal::ZERO, 10), Decimal::ZERO);
    }
}

//! proptest strategies for amounts and installment sequences

use proptest::prelude::*;

use core_kernel::{Currency, Money};

/// Strategy for currencies the gateway supports
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::INR),
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
        Just(Currency::SGD),
        Just(Currency::AED),
        Just(Currency::JPY),
    ]
}

/// Strategy for positive amounts in minor units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000_000i64
}

/// Strategy for positive amounts in any supported currency
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (positive_amount_minor_strategy(), currency_strategy())
        .prop_map(|(amount, currency)| Money::from_minor(amount, currency).expect("positive amount"))
}

/// Strategy for an invoice total and a sequence of partial payments
///
/// Each installment is positive; their sum may exceed the total, so callers
/// can check that over-payment is refused rather than credited.
pub fn installment_plan_strategy() -> impl Strategy<Value = (i64, Vec<i64>)> {
    (10_000i64..10_000_000i64).prop_flat_map(|total| {
        let installment = 1i64..=total;
        (Just(total), prop::collection::vec(installment, 1..8))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn prop_installments_are_positive_and_bounded((total, parts) in installment_plan_strategy()) {
            prop_assert!(!parts.is_empty());
            for part in parts {
                prop_assert!(part > 0 && part <= total);
            }
        }

        #[test]
        fn prop_generated_money_is_positive(money in positive_money_strategy()) {
            prop_assert!(money.is_positive());
        }
    }
}

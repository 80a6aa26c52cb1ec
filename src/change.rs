use crate::error::Error;

const NICKEL: f64 = 0.05;
const PENNY: f64 = 0.01;
const NICKEL_CENTS: f64 = 5.0;

/// How far `amount * 100` may sit from a whole number and still count as whole
/// cents, in ULPs. `0.07 * 100` is `7.000000000000001`.
const WHOLE_CENT_ULPS: f64 = 4.0;

/// A dollar amount broken into nickels and pennies, formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// `1,234.50`
    pub total: String,
    /// `24,690`
    pub nickels: String,
    pub pennies: String,
}

/// Breaks `input` into the fewest nickels plus pennies.
///
/// Nickels are floored and the remainder is rounded *up* to whole pennies, so
/// sub-cent amounts always cost an extra penny. Negative amounts follow the
/// same rule.
///
/// Returns `Ok(None)` for empty input. Whitespace alone is not empty.
///
/// # Errors
///
/// Returns [`Error::InvalidAmount`] if `input` is not a finite number.
pub fn make_change(input: &str) -> Result<Option<Change>, Error> {
    if input.is_empty() {
        return Ok(None);
    }

    let amount: f64 = input
        .trim()
        .parse()
        .map_err(|_| Error::InvalidAmount(input.to_string()))?;
    if !amount.is_finite() {
        return Err(Error::InvalidAmount(input.to_string()));
    }
    // "-0" prints as 0
    let amount = amount + 0.0;

    let (nickels, pennies) = coins(amount);
    Ok(Some(Change {
        total: format_money(amount),
        nickels: format_count(nickels),
        pennies: format_count(pennies),
    }))
}

fn coins(amount: f64) -> (f64, f64) {
    let cents = amount * 100.0;
    let whole = cents.round();
    if (cents - whole).abs() <= f64::EPSILON * WHOLE_CENT_ULPS * whole.abs().max(1.0) {
        let nickels = (whole / NICKEL_CENTS).floor();
        return (nickels, whole - NICKEL_CENTS * nickels);
    }

    let nickels = (amount / NICKEL).floor();
    let pennies = ((amount - NICKEL * nickels) / PENNY).ceil().max(0.0);
    (nickels, pennies)
}

fn format_count(count: f64) -> String {
    group_thousands(&format!("{:.0}", count + 0.0))
}

fn format_money(amount: f64) -> String {
    let fixed = format!("{amount:.2}");
    match fixed.split_once('.') {
        Some((whole, cents)) => format!("{}.{cents}", group_thousands(whole)),
        None => group_thousands(&fixed),
    }
}

fn group_thousands(number: &str) -> String {
    let (sign, digits) = match number.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", number),
    };
    let len = digits.len();
    let mut out = String::with_capacity(sign.len() + len + len / 3);
    out.push_str(sign);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(input: &str) -> Change {
        make_change(input).unwrap().unwrap()
    }

    #[test]
    fn one_dollar() {
        let c = change("1.00");
        assert_eq!(c.nickels, "20");
        assert_eq!(c.pennies, "0");
        assert_eq!(c.total, "1.00");
    }

    #[test]
    fn seven_cents() {
        let c = change("0.07");
        assert_eq!(c.nickels, "1");
        assert_eq!(c.pennies, "2");
    }

    #[test]
    fn exact_multiples_have_no_pennies() {
        for (input, nickels) in [("0.15", "3"), ("0.05", "1"), ("0.35", "7"), ("2.65", "53")] {
            let c = change(input);
            assert_eq!(c.nickels, nickels, "nickels for {input}");
            assert_eq!(c.pennies, "0", "pennies for {input}");
        }
    }

    #[test]
    fn zero() {
        let c = change("0");
        assert_eq!(c.nickels, "0");
        assert_eq!(c.pennies, "0");
        assert_eq!(c.total, "0.00");
    }

    #[test]
    fn sub_cent_remainder_rounds_up() {
        let c = change("0.071");
        assert_eq!(c.nickels, "1");
        assert_eq!(c.pennies, "3");

        let c = change("0.004");
        assert_eq!(c.nickels, "0");
        assert_eq!(c.pennies, "1");
    }

    #[test]
    fn thousands_separators() {
        let c = change("1234.5");
        assert_eq!(c.total, "1,234.50");
        assert_eq!(c.nickels, "24,690");
        assert_eq!(c.pennies, "0");

        let c = change("1000000");
        assert_eq!(c.total, "1,000,000.00");
        assert_eq!(c.nickels, "20,000,000");
        assert_eq!(c.pennies, "0");
    }

    #[test]
    fn large_amounts_never_overpay_in_nickels() {
        let c = change("100000.0499");
        assert_eq!(c.nickels, "2,000,000");
        assert_eq!(c.pennies, "5");

        let c = change("99999999.99");
        assert_eq!(c.nickels, "1,999,999,999");
        assert_eq!(c.pennies, "4");

        let c = change("123456789.01");
        assert_eq!(c.nickels, "2,469,135,780");
        assert_eq!(c.pennies, "1");
    }

    #[test]
    fn negative_amounts_use_the_same_rule() {
        let c = change("-1.00");
        assert_eq!(c.total, "-1.00");
        assert_eq!(c.nickels, "-20");
        assert_eq!(c.pennies, "0");

        let c = change("-0.07");
        assert_eq!(c.nickels, "-2");
        assert_eq!(c.pennies, "3");

        let c = change("-1234.5");
        assert_eq!(c.total, "-1,234.50");
        assert_eq!(c.nickels, "-24,690");
    }

    #[test]
    fn negative_zero_prints_as_zero() {
        let c = change("-0");
        assert_eq!(c.total, "0.00");
        assert_eq!(c.nickels, "0");
        assert_eq!(c.pennies, "0");
    }

    #[test]
    fn only_empty_input_is_no_op() {
        assert_eq!(make_change("").unwrap(), None);
        assert!(matches!(make_change("   "), Err(Error::InvalidAmount(_))));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(change(" 1.00 ").nickels, "20");
    }

    #[test]
    fn invalid_amounts() {
        for input in ["abc", "1.2.3", "$5", "NaN", "inf"] {
            assert!(
                matches!(make_change(input), Err(Error::InvalidAmount(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn group_thousands_boundaries() {
        assert_eq!(group_thousands("1"), "1");
        assert_eq!(group_thousands("123"), "123");
        assert_eq!(group_thousands("1234"), "1,234");
        assert_eq!(group_thousands("123456"), "123,456");
        assert_eq!(group_thousands("1234567"), "1,234,567");
        assert_eq!(group_thousands("-123"), "-123");
        assert_eq!(group_thousands("-1234"), "-1,234");
    }
}

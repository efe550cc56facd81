//! Boolean combinators and value selection

use crate::value::FieldValue;

fn is_true(value: &FieldValue) -> bool {
    matches!(value, FieldValue::Boolean(true))
}

/// XOR chain over the operands
pub(crate) fn one_of(args: &[FieldValue]) -> bool {
    args.iter().fold(false, |acc, v| acc ^ is_true(v))
}

/// Scans for the first true operand and confirms no later one is true.
/// With no true operand at all the result is false.
pub(crate) fn at_most_one(args: &[FieldValue]) -> bool {
    match args.iter().position(is_true) {
        Some(first) => !args[first + 1..].iter().any(is_true),
        None => false,
    }
}

/// First non-null operand
pub(crate) fn choose(args: &[FieldValue]) -> FieldValue {
    args.iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(FieldValue::Null)
}

pub(crate) fn is(value: &FieldValue) -> bool {
    !matches!(value, FieldValue::Null | FieldValue::Boolean(false))
}

pub(crate) fn is_false(value: &FieldValue) -> bool {
    matches!(value, FieldValue::Boolean(false))
}

/// Decimal value, 0 for anything else (integers are not widened)
pub(crate) fn num(value: &FieldValue) -> f64 {
    value.as_decimal().unwrap_or(0.0)
}

pub(crate) fn has_flags(bits: i64, mask: i64) -> bool {
    bits & mask != 0
}

// Library entry points

pub(super) fn call_one_of(args: &[FieldValue]) -> FieldValue {
    FieldValue::Boolean(one_of(args))
}

pub(super) fn call_at_most_one(args: &[FieldValue]) -> FieldValue {
    FieldValue::Boolean(at_most_one(args))
}

pub(super) fn call_choose(args: &[FieldValue]) -> FieldValue {
    choose(args)
}

pub(super) fn call_is(args: &[FieldValue]) -> FieldValue {
    FieldValue::Boolean(args.first().map(is).unwrap_or(false))
}

pub(super) fn call_false(args: &[FieldValue]) -> FieldValue {
    FieldValue::Boolean(args.first().map(is_false).unwrap_or(false))
}

pub(super) fn call_num(args: &[FieldValue]) -> FieldValue {
    FieldValue::Decimal(args.first().map(num).unwrap_or(0.0))
}

pub(super) fn call_has_flags(args: &[FieldValue]) -> FieldValue {
    let bits = args.first().and_then(FieldValue::as_integer);
    let mask = args.get(1).and_then(FieldValue::as_integer);
    match (bits, mask) {
        (Some(bits), Some(mask)) => FieldValue::Boolean(has_flags(bits, mask)),
        _ => FieldValue::Boolean(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bools(values: &[bool]) -> Vec<FieldValue> {
        values.iter().map(|b| FieldValue::Boolean(*b)).collect()
    }

    #[test]
    fn test_one_of_is_xor_chain() {
        assert!(one_of(&bools(&[true, false])));
        assert!(!one_of(&bools(&[true, true])));
        assert!(!one_of(&bools(&[false, false, false])));
        assert!(one_of(&bools(&[true, true, true])));
    }

    #[test]
    fn test_at_most_one() {
        assert!(!at_most_one(&bools(&[true, true])));
        assert!(at_most_one(&bools(&[true, false, false])));
        assert!(at_most_one(&bools(&[false, false, true])));
        assert!(!at_most_one(&bools(&[false, false])));
        assert!(!at_most_one(&bools(&[false, true, false, false, false, true])));
    }

    #[test]
    fn test_choose_first_non_null() {
        let args = vec![FieldValue::Null, FieldValue::Null, "A".into(), "B".into()];
        assert_eq!(choose(&args), FieldValue::Text("A".into()));
        assert_eq!(choose(&[FieldValue::Null, FieldValue::Null]), FieldValue::Null);
    }

    #[test]
    fn test_is_and_false() {
        assert!(is(&"x".into()));
        assert!(is(&FieldValue::Integer(0)));
        assert!(!is(&FieldValue::Null));
        assert!(!is(&FieldValue::Boolean(false)));

        assert!(is_false(&FieldValue::Boolean(false)));
        assert!(!is_false(&FieldValue::Null));
        assert!(!is_false(&FieldValue::Integer(0)));
    }

    #[test]
    fn test_num_does_not_widen() {
        assert_eq!(num(&FieldValue::Decimal(2.5)), 2.5);
        assert_eq!(num(&FieldValue::Integer(3)), 0.0);
        assert_eq!(num(&"3".into()), 0.0);
    }

    #[test]
    fn test_has_flags() {
        assert!(has_flags(0b1010, 0b0010));
        assert!(!has_flags(0b1010, 0b0101));
        assert_eq!(call_has_flags(&["x".into(), 1i64.into()]), FieldValue::Boolean(false));
    }
}

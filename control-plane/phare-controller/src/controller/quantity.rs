//! Resource quantities in canonical form.
//!
//! The API server rewrites quantities it stores (`1000m` becomes `1`,
//! `0.5Gi` becomes `512Mi`), so the spelling a parent uses never survives a
//! round trip. Values are parsed into an exact `mantissa * 10^exponent` pair
//! with trailing zeros folded into the exponent; two quantities are equal
//! when their pairs are.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const DECIMAL_SUFFIXES: [(&str, i32); 9] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 1),
    ("Mi", 2),
    ("Gi", 3),
    ("Ti", 4),
    ("Pi", 5),
    ("Ei", 6),
];

/// `(mantissa, exponent)` with no trailing zeros in the mantissa, or `None`
/// when `raw` is not a quantity.
pub fn canonical(raw: &str) -> Option<(i128, i32)> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '+' | '-')))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    let (mut mantissa, mut exponent) = decimal(number)?;

    match suffix {
        "" => {}
        s if s.len() > 1 && s.starts_with(['e', 'E']) => {
            exponent = exponent.checked_add(s[1..].parse::<i32>().ok()?)?;
        }
        s => {
            if let Some((_, power)) = BINARY_SUFFIXES.iter().find(|(b, _)| *b == s) {
                mantissa = mantissa.checked_mul(1024_i128.checked_pow(*power)?)?;
            } else {
                let (_, shift) = DECIMAL_SUFFIXES.iter().find(|(d, _)| *d == s)?;
                exponent = exponent.checked_add(*shift)?;
            }
        }
    }

    if mantissa == 0 {
        return Some((0, 0));
    }
    while mantissa % 10 == 0 {
        mantissa /= 10;
        exponent += 1;
    }
    Some((mantissa, exponent))
}

fn decimal(number: &str) -> Option<(i128, i32)> {
    let (negative, digits) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut mantissa: i128 = 0;
    for c in whole.chars().chain(fraction.chars()) {
        mantissa = mantissa
            .checked_mul(10)?
            .checked_add(i128::from(c.to_digit(10)?))?;
    }
    let exponent = -i32::try_from(fraction.len()).ok()?;
    Some((if negative { -mantissa } else { mantissa }, exponent))
}

/// Canonical spelling of `q`; unparseable values are kept verbatim.
pub fn normalize(q: &Quantity) -> Quantity {
    match canonical(&q.0) {
        Some((mantissa, exponent)) => Quantity(format!("{mantissa}e{exponent}")),
        None => q.clone(),
    }
}

fn normalize_map(map: Option<&mut BTreeMap<String, Quantity>>) {
    if let Some(map) = map {
        for q in map.values_mut() {
            *q = normalize(q);
        }
    }
}

/// Rewrites requests and limits in place.
pub fn normalize_requirements(r: &mut ResourceRequirements) {
    normalize_map(r.requests.as_mut());
    normalize_map(r.limits.as_mut());
}

pub fn same(a: Option<&Quantity>, b: Option<&Quantity>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => normalize(a) == normalize(b),
        (None, None) => true,
        _ => false,
    }
}

//! Metric and binary prefix tables used by prefixed unit instances.

use std::fmt;

/// Metric prefixes: name and power of ten.
const METRIC_PREFIXES: &[(&str, i32)] = &[
    ("quetta", 30),
    ("ronna", 27),
    ("yotta", 24),
    ("zetta", 21),
    ("exa", 18),
    ("peta", 15),
    ("tera", 12),
    ("giga", 9),
    ("mega", 6),
    ("kilo", 3),
    ("hecto", 2),
    ("deca", 1),
    ("deci", -1),
    ("centi", -2),
    ("milli", -3),
    ("micro", -6),
    ("nano", -9),
    ("pico", -12),
    ("femto", -15),
    ("atto", -18),
    ("zepto", -21),
    ("yocto", -24),
    ("ronto", -27),
    ("quecto", -30),
];

/// Binary prefixes: name and power of 1024.
const BINARY_PREFIXES: &[(&str, i32)] = &[
    ("kibi", 1),
    ("mebi", 2),
    ("gibi", 3),
    ("tebi", 4),
    ("pebi", 5),
    ("exbi", 6),
    ("zebi", 7),
    ("yobi", 8),
];

/// A prefix applied to an existing unit instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    /// Power of ten.
    Metric { name: &'static str, exponent: i32 },
    /// Power of 1024.
    Binary { name: &'static str, exponent: i32 },
}

impl Prefix {
    /// Look up a metric prefix by name, case-insensitively.
    pub fn metric(name: &str) -> Option<Prefix> {
        lookup(METRIC_PREFIXES, name).map(|(name, exponent)| Prefix::Metric { name, exponent })
    }

    /// Look up a binary prefix by name, case-insensitively.
    pub fn binary(name: &str) -> Option<Prefix> {
        lookup(BINARY_PREFIXES, name).map(|(name, exponent)| Prefix::Binary { name, exponent })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Prefix::Metric { name, .. } | Prefix::Binary { name, .. } => name,
        }
    }

    /// Multiplicative factor of the prefix.
    pub fn factor(&self) -> f64 {
        match self {
            Prefix::Metric { exponent, .. } => 10f64.powi(*exponent),
            Prefix::Binary { exponent, .. } => 1024f64.powi(*exponent),
        }
    }

    pub fn metric_names() -> String {
        names(METRIC_PREFIXES)
    }

    pub fn binary_names() -> String {
        names(BINARY_PREFIXES)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn lookup(table: &'static [(&'static str, i32)], name: &str) -> Option<(&'static str, i32)> {
    table
        .iter()
        .find(|(p, _)| p.eq_ignore_ascii_case(name))
        .copied()
}

fn names(table: &[(&str, i32)]) -> String {
    table.iter().map(|(n, _)| *n).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kilo_is_one_thousand() {
        let kilo = Prefix::metric("Kilo").unwrap();
        assert_eq!(kilo.factor(), 1000.0);
        assert_eq!(kilo.name(), "kilo");
    }

    #[test]
    fn small_metric_prefixes() {
        assert_eq!(Prefix::metric("milli").unwrap().factor(), 1e-3);
        assert_eq!(Prefix::metric("micro").unwrap().factor(), 1e-6);
    }

    #[test]
    fn binary_prefixes_are_powers_of_1024() {
        assert_eq!(Prefix::binary("kibi").unwrap().factor(), 1024.0);
        assert_eq!(Prefix::binary("Mebi").unwrap().factor(), 1024.0 * 1024.0);
    }

    #[test]
    fn unknown_prefix_is_none() {
        assert!(Prefix::metric("kibi").is_none());
        assert!(Prefix::binary("kilo").is_none());
        assert!(Prefix::metric("").is_none());
    }
}

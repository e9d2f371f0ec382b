//! Progressive bracket calculator used for reserved resources
//!
//! Reservations grow with node size but at a decreasing marginal rate,
//! the same way a progressive income tax does.

/// One bracket: every unit up to `upper_bound` above the previous
/// bracket's bound is charged at `rate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxBracket {
    pub upper_bound: f64,
    pub rate: f64,
}

impl TaxBracket {
    pub const fn new(upper_bound: f64, rate: f64) -> Self {
        Self { upper_bound, rate }
    }
}

/// Memory brackets, in GiB
pub const MEMORY_BRACKETS: &[TaxBracket] = &[
    TaxBracket::new(4.0, 0.25),
    TaxBracket::new(8.0, 0.20),
    TaxBracket::new(16.0, 0.10),
    TaxBracket::new(128.0, 0.06),
    TaxBracket::new(f64::INFINITY, 0.02),
];

/// CPU brackets, in cores
pub const CPU_BRACKETS: &[TaxBracket] = &[
    TaxBracket::new(1.0, 0.06),
    TaxBracket::new(2.0, 0.04),
    TaxBracket::new(4.0, 0.02),
    TaxBracket::new(f64::INFINITY, 0.01),
];

/// Total tax owed on `amount` under `brackets`
///
/// Brackets must be ordered by non-decreasing upper bound. Amounts at or
/// below zero owe nothing.
pub fn calculate(brackets: &[TaxBracket], amount: f64) -> f64 {
    let mut tax = 0.0;
    let mut lower_bound = 0.0;

    for bracket in brackets {
        if amount <= lower_bound {
            break;
        }
        tax += bracket.rate * (bracket.upper_bound.min(amount) - lower_bound);
        lower_bound = bracket.upper_bound;
    }

    tax
}

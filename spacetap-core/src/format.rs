//! Display formatting for large currency amounts.
//!
//! Values below 1000 show as plain truncated integers. Larger values are
//! divided by powers of 1000 and given a suffix: `K`, `M`, `B`, `T`, then
//! the two-letter sequence `aa`, `ab`, ... `az`, `ba`, ... `zz`. The mantissa
//! keeps at most three significant digits with trailing zeros removed.

use lazy_static::lazy_static;

/// Suffixes before the generated two-letter sequence starts.
const NAMED_SUFFIXES: [&str; 4] = ["K", "M", "B", "T"];

lazy_static! {
    static ref DEFAULT_FORMATTER: NumberFormatter = NumberFormatter::new(generate_suffixes());
}

/// Build the full suffix table: `K, M, B, T, aa, ab, ..., zz`.
pub fn generate_suffixes() -> Vec<String> {
    let mut suffixes: Vec<String> = NAMED_SUFFIXES.iter().map(|s| s.to_string()).collect();
    for first in 'a'..='z' {
        for second in 'a'..='z' {
            suffixes.push(format!("{first}{second}"));
        }
    }
    suffixes
}

/// Formats numbers against a suffix table.
///
/// `suffixes[0]` is used for thousands, `suffixes[1]` for millions and so on.
/// Values beyond the last suffix fall back to scientific notation.
#[derive(Debug, Clone)]
pub struct NumberFormatter {
    suffixes: Vec<String>,
}

impl Default for NumberFormatter {
    fn default() -> Self {
        Self::new(generate_suffixes())
    }
}

impl NumberFormatter {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self { suffixes }
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Format a value for display.
    pub fn format(&self, value: f64) -> String {
        if !value.is_finite() {
            return format!("{value:.2e}");
        }

        let magnitude = value.abs();
        if magnitude < 1000.0 {
            return format!("{}", value.trunc() as i64);
        }

        let sign = if value < 0.0 { "-" } else { "" };

        let mut mantissa = magnitude;
        let mut tier = 0usize;
        while mantissa >= 1000.0 {
            mantissa /= 1000.0;
            tier += 1;
        }

        let mut digits = three_significant(mantissa);
        // 999.95 rounds up to "1000", which belongs to the next tier
        if digits.parse::<f64>().map_or(false, |m| m >= 1000.0) {
            tier += 1;
            digits = "1".to_string();
        }

        match self.suffixes.get(tier - 1) {
            Some(suffix) => format!("{sign}{digits}{suffix}"),
            None => format!("{sign}{magnitude:.2e}"),
        }
    }
}

/// Format a value with the standard suffix table.
pub fn format_number(value: f64) -> String {
    DEFAULT_FORMATTER.format(value)
}

/// Round a mantissa in `[1, 1000)` to three significant digits.
fn three_significant(mantissa: f64) -> String {
    let decimals = if mantissa >= 100.0 {
        0
    } else if mantissa >= 10.0 {
        1
    } else {
        2
    };

    let text = format!("{mantissa:.decimals$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

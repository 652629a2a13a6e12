//! Number formatting shared by the report prose and tables.

/// `1234567` → `"1,234,567"`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Full amount, e.g. `"119,000 AZN"`.
pub fn azn(value: f64) -> String {
    format!("{} AZN", group_thousands(value.max(0.0).round() as u64))
}

/// Compact amount used in prose, e.g. `"119K AZN"` or `"1.2M AZN"`.
pub fn azn_short(value: f64) -> String {
    if value.round() < 1_000.0 {
        return azn(value);
    }
    // unit is picked after rounding so 999,600 reads as 1.0M, not 1000K
    let thousands = (value / 1_000.0).round();
    if thousands < 1_000.0 {
        format!("{thousands:.0}K AZN")
    } else {
        format!("{:.1}M AZN", value / 1_000_000.0)
    }
}

pub fn percent(value: f64) -> String {
    format!("{value:.1}%")
}

pub fn count(value: usize) -> String {
    group_thousands(value as u64)
}

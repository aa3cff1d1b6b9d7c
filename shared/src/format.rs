/// Render a value as a thousands-grouped integer, truncating any fraction.
///
/// `1234567.8` becomes `"1,234,567"` and `-1500.0` becomes `"-1,500"`.
pub fn format_thousands(value: f64) -> String {
    let whole = value.trunc() as i64;
    let digits = whole.unsigned_abs().to_string();

    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if whole < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Human label for a variable column stem: underscores become spaces and each
/// word is title-cased (`TOTAL_FARM_AREA` -> `Total Farm Area`).
pub fn variable_label(variable: &str) -> String {
    variable
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{format_thousands, variable_label};

    #[test]
    fn groups_thousands() {
        assert_eq!(format_thousands(0.0), "0");
        assert_eq!(format_thousands(50.0), "50");
        assert_eq!(format_thousands(999.0), "999");
        assert_eq!(format_thousands(1000.0), "1,000");
        assert_eq!(format_thousands(1234567.0), "1,234,567");
    }

    #[test]
    fn truncates_fractions_toward_zero() {
        assert_eq!(format_thousands(1999.99), "1,999");
        assert_eq!(format_thousands(-0.7), "0");
        assert_eq!(format_thousands(-1500.2), "-1,500");
    }

    #[test]
    fn labels_variables() {
        assert_eq!(variable_label("TOTAL_FARM_AREA"), "Total Farm Area");
        assert_eq!(variable_label("farms"), "Farms");
        assert_eq!(variable_label("hay__acres"), "Hay Acres");
    }
}

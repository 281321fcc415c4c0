//! Seat-code notation.
//!
//! Buses label seats either row-first ("1A") or column-first ("A1"). Both
//! spellings name the same seat, so codes are compared in canonical
//! row-first form: digits without leading zeros followed by letters.

/// Canonical form of a seat code, or `None` for an empty code.
///
/// Codes that are neither letters+digits nor digits+letters ("VIP", "12",
/// "A1B") are kept as opaque upper-case labels.
pub fn normalize_seat_code(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(|c| c.to_uppercase())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let letters_first = split_run(&cleaned, |c| c.is_ascii_alphabetic());
    let digits_first = split_run(&cleaned, |c| c.is_ascii_digit());

    let canonical = match (letters_first, digits_first) {
        (Some((letters, digits)), _) if is_all(digits, |c| c.is_ascii_digit()) => {
            format!("{}{}", trim_zeros(digits), letters)
        }
        (_, Some((digits, letters))) if is_all(letters, |c| c.is_ascii_alphabetic()) => {
            format!("{}{}", trim_zeros(digits), letters)
        }
        _ => cleaned,
    };

    Some(canonical)
}

/// True when two raw codes name the same seat.
pub fn same_seat(a: &str, b: &str) -> bool {
    match (normalize_seat_code(a), normalize_seat_code(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn split_run(s: &str, pred: impl Fn(char) -> bool) -> Option<(&str, &str)> {
    let end = s.find(|c: char| !pred(c))?;
    if end == 0 {
        return None;
    }
    Some(s.split_at(end))
}

fn is_all(s: &str, pred: impl Fn(char) -> bool) -> bool {
    !s.is_empty() && s.chars().all(pred)
}

fn trim_zeros(digits: &str) -> &str {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}

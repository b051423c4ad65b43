use rust_decimal::Decimal;

/// Format an amount the way the bank shows it: 1.234,56 EUR
pub fn money(val: Decimal, currency: &str) -> String {
    let negative = val.is_sign_negative() && !val.is_zero();
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut with_dots = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_dots.push('.');
        }
        with_dots.push(c);
    }
    let with_dots: String = with_dots.chars().rev().collect();

    if negative {
        format!("-{with_dots},{dec_part} {currency}")
    } else {
        format!("{with_dots},{dec_part} {currency}")
    }
}

/// Byte count for log lines: bytes and KB as whole numbers, MB and up with decimals.
pub fn human_size(size_bytes: usize) -> String {
    if size_bytes == 1 {
        return "1 byte".to_string();
    }
    const SUFFIXES: &[(&str, usize)] = &[("bytes", 0), ("KB", 0), ("MB", 1), ("GB", 2), ("TB", 2), ("PB", 2)];

    let mut num = size_bytes as f64;
    let mut chosen = SUFFIXES[0];
    for &(suffix, precision) in SUFFIXES {
        chosen = (suffix, precision);
        if num < 1024.0 {
            break;
        }
        num /= 1024.0;
    }

    let (suffix, precision) = chosen;
    if precision == 0 {
        format!("{} {suffix}", num as u64)
    } else {
        format!("{num:.precision$} {suffix}")
    }
}

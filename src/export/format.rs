use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

/// `$1,234.56`, with a leading minus for negative amounts.
pub fn format_usd(amount: f64) -> String {
    let rounded = (amount * 100.0).round() / 100.0;
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{}${}", sign, group_thousands(rounded.abs(), 2))
}

/// Like [`format_usd`] but `N/A` when there was no price.
pub fn format_usd_opt(amount: Option<f64>) -> String {
    amount.map(format_usd).unwrap_or_else(|| "N/A".to_string())
}

/// Count, or `N/A` when it is not known.
pub fn format_count_opt(count: Option<u64>) -> String {
    count
        .map(|c| c.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Integer with thousands separators: `56,755`.
pub fn group_count(count: u64) -> String {
    group_thousands(count as f64, 0)
}

/// Compact currency for display: `$1.23M`, `$45.60K`, `$999.00`.
pub fn format_currency(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let abs = amount.abs();
    if abs >= 1_000_000.0 {
        format!("{}${}M", sign, group_thousands(abs / 1_000_000.0, 2))
    } else if abs >= 1_000.0 {
        format!("{}${}K", sign, group_thousands(abs / 1_000.0, 2))
    } else {
        format!("{}${}", sign, group_thousands(abs, 2))
    }
}

/// `0x1234...abcd` style truncation, keeping `chars` characters on each side.
pub fn short_address(address: &str, chars: usize) -> String {
    let count = address.chars().count();
    if count <= chars * 2 + 3 {
        return address.to_string();
    }
    let head: String = address.chars().take(chars).collect();
    let tail: String = address.chars().skip(count - chars).collect();
    format!("{}...{}", head, tail)
}

/// Native amount with six decimals.
pub fn format_native(amount: &BigDecimal) -> String {
    amount.round(6).with_scale(6).to_string()
}

pub fn format_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value);
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut out = String::with_capacity(formatted.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

//! Kubernetes quantity parsing ("500m", "2Gi", "150000n", "1.5e3").

/// Parse a quantity into its magnitude in base units (cores, bytes, plain).
///
/// Returns `None` for text that is not a quantity. The grammar covers plain
/// and scientific decimals, the decimal suffixes n/u/m/k/M/G/T/P/E and the
/// binary suffixes Ki/Mi/Gi/Ti/Pi/Ei.
pub fn parse(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    // Plain and scientific decimals parse wholesale ("1.5", "12e6", "-3").
    if let Ok(v) = s.parse::<f64>() {
        return v.is_finite().then_some(v);
    }
    let suffix_len = s.chars().rev().take_while(|c| c.is_ascii_alphabetic()).count();
    let (num, suffix) = s.split_at(s.len() - suffix_len);
    let base: f64 = num.parse().ok()?;
    if !base.is_finite() {
        return None;
    }
    Some(base * multiplier(suffix)?)
}

/// Magnitude scaled to milli-units, rounded (cpu cores -> millicores).
pub fn parse_millis(s: &str) -> Option<u64> {
    parse(s).map(|v| (v * 1000.0).round().max(0.0) as u64)
}

/// Magnitude rounded to whole base units (memory -> bytes).
pub fn parse_whole(s: &str) -> Option<u64> {
    parse(s).map(|v| v.round().max(0.0) as u64)
}

fn multiplier(suffix: &str) -> Option<f64> {
    Some(match suffix {
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        _ => return None,
    })
}

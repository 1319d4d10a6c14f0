//! Floor-lifted min-max normalization shared by the lexical and semantic
//! passes.

use std::collections::HashMap;

/// Map raw scores (higher is better) into `[floor, 1.0]`. An empty input
/// maps to an empty output. When every value is equal, everything maps to
/// 1.0 (there's no spread to distribute across the floor-lifted range).
pub fn normalize(raw: &HashMap<String, f64>, floor: f64) -> HashMap<String, f64> {
    if raw.is_empty() {
        return HashMap::new();
    }
    let min = raw.values().cloned().fold(f64::INFINITY, f64::min);
    let max = raw.values().cloned().fold(f64::NEG_INFINITY, f64::max);

    raw.iter()
        .map(|(k, v)| {
            let normalized = if (max - min).abs() < f64::EPSILON {
                1.0
            } else {
                floor + (1.0 - floor) * (v - min) / (max - min)
            };
            (k.clone(), normalized)
        })
        .collect()
}

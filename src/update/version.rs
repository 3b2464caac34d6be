use std::cmp::Ordering;

/// Dot-separated integer components. Anything that is not an integer
/// counts as 0.
fn components(version: &str) -> Vec<i64> {
    version
        .split('.')
        .map(|component| component.parse().unwrap_or(0))
        .collect()
}

/// Returns `true` when `candidate` orders strictly after `current`.
///
/// Components are compared position by position and the first difference
/// decides. When every shared position is equal the version with more
/// components is newer, so `1.0` < `1.0.1` and also `1.0` < `1.0.0`.
pub fn is_newer(current: &str, candidate: &str) -> bool {
    let current = components(current);
    let candidate = components(candidate);

    for (new, old) in candidate.iter().zip(&current) {
        match new.cmp(old) {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => {}
        }
    }

    candidate.len() > current.len()
}

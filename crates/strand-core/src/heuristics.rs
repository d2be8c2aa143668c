// Copyright 2024 Strand Project
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Branch-distance helpers.
//!
//! All heuristics live in `[0, 1]` where `1` means the constraint is satisfied.
//! Distances are non-negative and `0` means satisfied; [`normalize`] maps
//! them monotonically into `[0, 1)`.

/// Monotonic normalisation of a non-negative distance: `d / (d + 1)`.
pub fn normalize(distance: f64) -> f64 {
    if distance.is_nan() {
        return 1.0;
    }
    if distance.is_infinite() {
        return 1.0;
    }
    let d = distance.max(0.0);
    d / (d + 1.0)
}

/// Turns a distance into a heuristic: `1 / (1 + d)`.
pub fn distance_to_heuristic(distance: f64) -> f64 {
    1.0 - normalize(distance)
}

/// Heuristic for `a == b`.
pub fn equality_heuristic(a: f64, b: f64) -> f64 {
    if a == b {
        return 1.0;
    }
    distance_to_heuristic((a - b).abs())
}

/// Heuristic for `a < b`.
pub fn less_than_heuristic(a: f64, b: f64) -> f64 {
    if a < b {
        return 1.0;
    }
    // a >= b, need to go down by (a - b) plus the smallest step
    distance_to_heuristic(a - b + 1.0)
}

/// Heuristic for `a <= b`.
pub fn less_or_equal_heuristic(a: f64, b: f64) -> f64 {
    if a <= b {
        return 1.0;
    }
    distance_to_heuristic(a - b)
}

/// Character-wise distance between two strings, aligned from the left.
///
/// Each differing character contributes its code point gap; each missing
/// character costs the maximum code point gap of the alphabet.
pub fn left_alignment_distance(a: &str, b: &str) -> f64 {
    const MAX_CHAR_DISTANCE: f64 = 65_536.0;
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let diff = (a.len() as i64 - b.len() as i64).unsigned_abs() as f64;
    let common: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as i64 - *y as i64).unsigned_abs() as f64)
        .sum();
    diff * MAX_CHAR_DISTANCE + common
}

/// Heuristic for string equality based on [`left_alignment_distance`].
pub fn string_equality_heuristic(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    distance_to_heuristic(left_alignment_distance(a, b))
}

/// Clamp a raw heuristic reported by a controller into `[0, 1]`.
pub fn clamp_heuristic(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_is_monotonic() {
        let mut previous = -1.0;
        for d in [0.0, 0.5, 1.0, 10.0, 1_000.0, 1e9] {
            let n = normalize(d);
            assert!(n > previous);
            assert!((0.0..1.0).contains(&n));
            previous = n;
        }
        assert_eq!(normalize(f64::INFINITY), 1.0);
    }

    #[test]
    fn test_equality_heuristic_gradient() {
        assert_eq!(equality_heuristic(42.0, 42.0), 1.0);
        assert!((equality_heuristic(41.0, 42.0) - 0.5).abs() < 1e-12);
        assert!(equality_heuristic(40.0, 42.0) < equality_heuristic(41.0, 42.0));
    }

    #[test]
    fn test_ordering_heuristics() {
        assert_eq!(less_than_heuristic(1.0, 2.0), 1.0);
        assert!(less_than_heuristic(2.0, 2.0) < 1.0);
        assert_eq!(less_or_equal_heuristic(2.0, 2.0), 1.0);
        assert!(less_or_equal_heuristic(5.0, 2.0) < less_or_equal_heuristic(3.0, 2.0));
    }

    #[test]
    fn test_string_distance() {
        assert_eq!(left_alignment_distance("abc", "abc"), 0.0);
        assert_eq!(left_alignment_distance("abc", "abd"), 1.0);
        assert!(string_equality_heuristic("abd", "abc") > string_equality_heuristic("ab", "abc"));
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_heuristic(1.5), 1.0);
        assert_eq!(clamp_heuristic(-0.1), 0.0);
        assert_eq!(clamp_heuristic(f64::NAN), 0.0);
    }
}

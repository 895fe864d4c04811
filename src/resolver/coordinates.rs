//! Parsing and rescaling of coordinate-list answers.
//!
//! The services encode click positions in two dialects: a JSON nested list
//! (`[[23.21, 82.11]]`) and semicolon-joined pairs
//! (`coordinates:x=39,y=59;x=252,y=72`).

use regex::Regex;

/// A tap position in original-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapPoint {
    pub x: i64,
    pub y: i64,
}

/// Parse a solved answer into raw coordinate pairs.
///
/// `None` means the text holds no recognizable coordinates at all; an
/// explicit empty list (`[]`) parses to `Some` of an empty vector, which
/// callers treat as "nothing to click".
pub fn parse_coordinates(text: &str) -> Option<Vec<(f64, f64)>> {
    if let Ok(pairs) = serde_json::from_str::<Vec<[f64; 2]>>(text.trim()) {
        return Some(pairs.into_iter().map(|[x, y]| (x, y)).collect());
    }

    let pair = Regex::new(r"x=(\d+),y=(\d+)").expect("static pattern");
    let pairs: Vec<(f64, f64)> = pair
        .captures_iter(text)
        .filter_map(|cap| {
            Some((
                cap.get(1)?.as_str().parse().ok()?,
                cap.get(2)?.as_str().parse().ok()?,
            ))
        })
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs)
    }
}

/// Map reduced-space pairs back to original pixel space, preserving order.
pub fn rescale(pairs: &[(f64, f64)], factor: f64) -> Vec<TapPoint> {
    pairs
        .iter()
        .map(|&(x, y)| TapPoint {
            x: (x * factor).round() as i64,
            y: (y * factor).round() as i64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lists_parse_with_floats() {
        let pairs = parse_coordinates("[[23.21, 82.11], [10, 20]]").unwrap();
        assert_eq!(pairs, vec![(23.21, 82.11), (10.0, 20.0)]);
    }

    #[test]
    fn pair_dialect_parses() {
        let pairs = parse_coordinates("coordinates:x=39,y=59;x=252,y=72").unwrap();
        assert_eq!(pairs, vec![(39.0, 59.0), (252.0, 72.0)]);
    }

    #[test]
    fn blank_list_is_not_absence() {
        assert_eq!(parse_coordinates("[]"), Some(vec![]));
        assert_eq!(parse_coordinates(""), None);
        assert_eq!(parse_coordinates("nothing useful"), None);
    }

    #[test]
    fn rescale_rounds_and_preserves_order() {
        let pairs = vec![(10.0, 20.0), (33.4, 66.6)];
        let points = rescale(&pairs, 1.5);
        assert_eq!(points.len(), pairs.len());
        assert_eq!(points[0], TapPoint { x: 15, y: 30 });
        assert_eq!(points[1], TapPoint { x: 50, y: 100 });
    }

    #[test]
    fn unit_factor_is_identity_up_to_rounding() {
        let points = rescale(&[(23.21, 82.11)], 1.0);
        assert_eq!(points, vec![TapPoint { x: 23, y: 82 }]);
    }
}

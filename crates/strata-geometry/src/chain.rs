//! Greedy nearest-neighbor ordering of point sets.

use crate::point::Point;

/// Visit order over `points` by repeated nearest-neighbor search starting
/// from the first point.
pub fn chained_path(points: &[Point]) -> Vec<usize> {
    match points.first() {
        Some(first) => chained_path_from(points, *first),
        None => Vec::new(),
    }
}

/// Visit order over `points` by repeated nearest-neighbor search starting
/// from `start`.
pub fn chained_path_from(points: &[Point], start: Point) -> Vec<usize> {
    let mut order = Vec::with_capacity(points.len());
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut current = start;
    while !remaining.is_empty() {
        let (slot, _) = remaining
            .iter()
            .enumerate()
            .min_by(|(_, &a), (_, &b)| {
                current
                    .distance_to_sq(points[a])
                    .partial_cmp(&current.distance_to_sq(points[b]))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("remaining is non-empty");
        let index = remaining.remove(slot);
        current = points[index];
        order.push(index);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chained_path_from() {
        let points = vec![
            Point::new(100, 0),
            Point::new(10, 0),
            Point::new(50, 0),
        ];
        let order = chained_path_from(&points, Point::new(0, 0));
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_empty() {
        assert!(chained_path(&[]).is_empty());
    }
}

// Restricted-zone polygons and point containment.

use serde::{Deserialize, Serialize};

use super::model::Point;

/// Tolerance used to decide that a point lies on a polygon edge.
const EDGE_EPSILON: f64 = 1e-9;

/// A named, closed polygon. The last vertex connects back to the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub points: Vec<Point>,
}

impl Zone {
    pub fn new(name: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    pub fn rectangle(name: impl Into<String>, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(
            name,
            vec![
                Point::new(x1, y1),
                Point::new(x2, y1),
                Point::new(x2, y2),
                Point::new(x1, y2),
            ],
        )
    }

    /// Boundary-inclusive containment. Polygons with fewer than 3 vertices contain nothing.
    pub fn contains(&self, point: &Point) -> bool {
        let vertices = &self.points;
        if vertices.len() < 3 {
            return false;
        }

        let n = vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            if on_segment(point, &vertices[j], &vertices[i]) {
                return true;
            }
            j = i;
        }

        // Ray casting
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (pi, pj) = (&vertices[i], &vertices[j]);
            if (pi.y > point.y) != (pj.y > point.y)
                && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

fn on_segment(p: &Point, a: &Point, b: &Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let scale = (b.x - a.x).abs().max((b.y - a.y).abs()).max(1.0);
    if cross.abs() > EDGE_EPSILON * scale {
        return false;
    }
    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}

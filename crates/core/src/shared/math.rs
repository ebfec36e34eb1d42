//! Shared geometry for detection post-processing.
//!
//! Boxes are `[x1, y1, x2, y2]` in pixels; points are `(x, y)`.

pub type BBox = [f64; 4];

pub fn bbox_area(b: &BBox) -> f64 {
    (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

fn intersection(a: &BBox, b: &BBox) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);
    (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
}

/// Intersection over union.
pub fn bbox_iou(a: &BBox, b: &BBox) -> f64 {
    let inter = intersection(a, b);
    if inter == 0.0 {
        return 0.0;
    }
    inter / (bbox_area(a) + bbox_area(b) - inter)
}

/// Intersection over the smaller box. Catches a clipped half-object at a
/// tile seam that IoU alone scores too low.
pub fn bbox_ios(a: &BBox, b: &BBox) -> f64 {
    let inter = intersection(a, b);
    if inter == 0.0 {
        return 0.0;
    }
    let smaller = bbox_area(a).min(bbox_area(b));
    if smaller <= 0.0 {
        return 0.0;
    }
    inter / smaller
}

pub fn bbox_union(a: &BBox, b: &BBox) -> BBox {
    [a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])]
}

/// Shoelace area of a simple polygon.
pub fn polygon_area(points: &[(f64, f64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..points.len() {
        let (x1, y1) = points[i];
        let (x2, y2) = points[(i + 1) % points.len()];
        twice += x1 * y2 - x2 * y1;
    }
    twice.abs() / 2.0
}

/// Convex hull (Andrew's monotone chain), counter-clockwise, no collinear points.
pub fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = points.to_vec();
    pts.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    }

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

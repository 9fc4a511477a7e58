//! Planar geometry for footprints and tile rectangles.
//!
//! Coordinates are in the raster's ground units. Rings are stored closed
//! (first vertex repeated at the end).

pub type Coord = (f64, f64);

const EPSILON: f64 = 1e-9;

/// Axis-aligned rectangle in ground units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    /// Extent of a north-up raster from its geotransform and size in pixels.
    pub fn from_geotransform(gt: &[f64; 6], width: usize, height: usize) -> Self {
        let x0 = gt[0];
        let y0 = gt[3];
        let x1 = x0 + gt[1] * width as f64;
        let y1 = y0 + gt[5] * height as f64;
        Self::new(x0.min(x1), x0.max(x1), y0.min(y1), y0.max(y1))
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> Coord {
        ((self.xmin + self.xmax) / 2.0, (self.ymin + self.ymax) / 2.0)
    }

    /// Grow (or shrink, for negative `margin`) by `margin` on every side.
    pub fn buffered(&self, margin: f64) -> Self {
        Self::new(
            self.xmin - margin,
            self.xmax + margin,
            self.ymin - margin,
            self.ymax + margin,
        )
    }

    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        let e = Extent::new(
            self.xmin.max(other.xmin),
            self.xmax.min(other.xmax),
            self.ymin.max(other.ymin),
            self.ymax.min(other.ymax),
        );
        if e.width() > 0.0 && e.height() > 0.0 {
            Some(e)
        } else {
            None
        }
    }

    pub fn contains_extent(&self, other: &Extent, tolerance: f64) -> bool {
        other.xmin >= self.xmin - tolerance
            && other.xmax <= self.xmax + tolerance
            && other.ymin >= self.ymin - tolerance
            && other.ymax <= self.ymax + tolerance
    }

    /// Closed counter-clockwise ring.
    pub fn to_ring(&self) -> Vec<Coord> {
        vec![
            (self.xmin, self.ymin),
            (self.xmax, self.ymin),
            (self.xmax, self.ymax),
            (self.xmin, self.ymax),
            (self.xmin, self.ymin),
        ]
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(self.to_ring(), Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    pub interiors: Vec<Vec<Coord>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Coord>, interiors: Vec<Vec<Coord>>) -> Self {
        Self {
            exterior: close_ring(exterior),
            interiors: interiors.into_iter().map(close_ring).collect(),
        }
    }

    pub fn area(&self) -> f64 {
        let holes: f64 = self.interiors.iter().map(|r| ring_area(r).abs()).sum();
        (ring_area(&self.exterior).abs() - holes).max(0.0)
    }

    pub fn vertex_count(&self) -> usize {
        self.exterior.len() + self.interiors.iter().map(Vec::len).sum::<usize>()
    }

    /// True only for points in the interior; boundary points are outside.
    pub fn contains_strict(&self, p: Coord) -> bool {
        if on_ring(&self.exterior, p) || !ring_contains(&self.exterior, p) {
            return false;
        }
        !self
            .interiors
            .iter()
            .any(|hole| on_ring(hole, p) || ring_contains(hole, p))
    }

    fn simplified(&self, tolerance: f64) -> Polygon {
        let exterior = simplify_ring(&self.exterior, tolerance).unwrap_or_else(|| self.exterior.clone());
        let interiors = self
            .interiors
            .iter()
            .filter_map(|r| simplify_ring(r, tolerance))
            .collect();
        Polygon {
            exterior,
            interiors,
        }
    }
}

/// One or more polygons; a single-part footprint is the common case.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPolygon(pub Vec<Polygon>);

impl MultiPolygon {
    pub fn area(&self) -> f64 {
        self.0.iter().map(Polygon::area).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|p| p.exterior.len() < 4)
    }

    pub fn vertex_count(&self) -> usize {
        self.0.iter().map(Polygon::vertex_count).sum()
    }

    pub fn bounds(&self) -> Option<Extent> {
        let mut points = self.0.iter().flat_map(|p| p.exterior.iter());
        let &(x, y) = points.next()?;
        let mut e = Extent::new(x, x, y, y);
        for &(x, y) in points {
            e.xmin = e.xmin.min(x);
            e.xmax = e.xmax.max(x);
            e.ymin = e.ymin.min(y);
            e.ymax = e.ymax.max(y);
        }
        Some(e)
    }

    pub fn contains_strict(&self, p: Coord) -> bool {
        self.0.iter().any(|poly| poly.contains_strict(p))
    }

    /// Douglas-Peucker simplification of every ring. Exterior rings that would
    /// collapse keep their original vertices; collapsing holes are dropped.
    pub fn simplify(&self, tolerance: f64) -> MultiPolygon {
        MultiPolygon(self.0.iter().map(|p| p.simplified(tolerance)).collect())
    }
}

impl From<Polygon> for MultiPolygon {
    fn from(p: Polygon) -> Self {
        MultiPolygon(vec![p])
    }
}

fn close_ring(mut ring: Vec<Coord>) -> Vec<Coord> {
    if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}

/// Shoelace formula; positive for counter-clockwise rings.
fn ring_area(ring: &[Coord]) -> f64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum::<f64>()
        / 2.0
}

// Even-odd ray casting.
fn ring_contains(ring: &[Coord], (px, py): Coord) -> bool {
    let mut inside = false;
    for w in ring.windows(2) {
        let ((x1, y1), (x2, y2)) = (w[0], w[1]);
        if (y1 > py) != (y2 > py) {
            let x_cross = x1 + (py - y1) * (x2 - x1) / (y2 - y1);
            if px < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn on_ring(ring: &[Coord], p: Coord) -> bool {
    ring.windows(2)
        .any(|w| point_segment_distance(p, w[0], w[1]) < EPSILON)
}

fn point_segment_distance(p: Coord, a: Coord, b: Coord) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return ((p.0 - a.0).powi(2) + (p.1 - a.1).powi(2)).sqrt();
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0);
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

fn simplify_ring(ring: &[Coord], tolerance: f64) -> Option<Vec<Coord>> {
    if ring.len() <= 4 {
        return Some(ring.to_vec());
    }
    let mut keep = vec![false; ring.len()];
    keep[0] = true;
    keep[ring.len() - 1] = true;
    douglas_peucker(ring, 0, ring.len() - 1, tolerance, &mut keep);

    let out: Vec<Coord> = ring
        .iter()
        .zip(&keep)
        .filter_map(|(&c, &k)| k.then_some(c))
        .collect();
    if out.len() < 4 || ring_area(&out).abs() < EPSILON {
        None
    } else {
        Some(out)
    }
}

fn douglas_peucker(points: &[Coord], first: usize, last: usize, tolerance: f64, keep: &mut [bool]) {
    if last <= first + 1 {
        return;
    }
    let (mut index, mut max_dist) = (first, 0.0);
    for i in first + 1..last {
        let d = point_segment_distance(points[i], points[first], points[last]);
        if d > max_dist {
            index = i;
            max_dist = d;
        }
    }
    if max_dist > tolerance {
        keep[index] = true;
        douglas_peucker(points, first, index, tolerance, keep);
        douglas_peucker(points, index, last, tolerance, keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon {
        Extent::new(x0, x0 + size, y0, y0 + size).to_polygon()
    }

    #[test]
    fn test_extent_from_geotransform() {
        let gt = [1000.0, 10.0, 0.0, 2000.0, 0.0, -10.0];
        let e = Extent::from_geotransform(&gt, 50, 20);
        assert_eq!(e, Extent::new(1000.0, 1500.0, 1800.0, 2000.0));
    }

    #[test]
    fn test_polygon_area_with_hole() {
        let outer = Extent::new(0.0, 10.0, 0.0, 10.0).to_ring();
        let hole = Extent::new(2.0, 4.0, 2.0, 4.0).to_ring();
        let poly = Polygon::new(outer, vec![hole]);
        assert!((poly.area() - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_contains_strict_excludes_boundary() {
        let poly = square(0.0, 0.0, 50.0);
        assert!(poly.contains_strict((25.0, 25.0)));
        assert!(!poly.contains_strict((50.0, 25.0)));
        assert!(!poly.contains_strict((0.0, 0.0)));
        assert!(!poly.contains_strict((75.0, 25.0)));
    }

    #[test]
    fn test_contains_strict_respects_holes() {
        let outer = Extent::new(0.0, 10.0, 0.0, 10.0).to_ring();
        let hole = Extent::new(2.0, 4.0, 2.0, 4.0).to_ring();
        let poly = Polygon::new(outer, vec![hole]);
        assert!(!poly.contains_strict((3.0, 3.0)));
        assert!(poly.contains_strict((6.0, 6.0)));
    }

    #[test]
    fn test_ring_is_closed_on_construction() {
        let poly = Polygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)], Vec::new());
        assert_eq!(poly.exterior.first(), poly.exterior.last());
        assert_eq!(poly.exterior.len(), 4);
    }

    #[test]
    fn test_simplify_drops_collinear_vertices() {
        // Square with extra points on every edge
        let ring = vec![
            (0.0, 0.0),
            (5.0, 0.0),
            (10.0, 0.0),
            (10.0, 5.0),
            (10.0, 10.0),
            (5.0, 10.0),
            (0.0, 10.0),
            (0.0, 5.0),
        ];
        let mp = MultiPolygon::from(Polygon::new(ring, Vec::new()));
        let simplified = mp.simplify(0.5);
        assert_eq!(simplified.vertex_count(), 5);
        assert!((simplified.area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_of_multipolygon() {
        let mp = MultiPolygon(vec![square(0.0, 0.0, 10.0), square(20.0, 5.0, 10.0)]);
        assert_eq!(mp.bounds(), Some(Extent::new(0.0, 30.0, 0.0, 15.0)));
        assert!(MultiPolygon(Vec::new()).bounds().is_none());
    }

    #[test]
    fn test_intersection() {
        let a = Extent::new(0.0, 10.0, 0.0, 10.0);
        let b = Extent::new(10.0, 20.0, 0.0, 10.0);
        assert!(a.intersection(&b).is_none());
        let c = Extent::new(5.0, 15.0, 5.0, 15.0);
        assert_eq!(a.intersection(&c), Some(Extent::new(5.0, 10.0, 5.0, 10.0)));
    }
}

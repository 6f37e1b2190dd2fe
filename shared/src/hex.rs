//! Hex grid geometry: axial/cube coordinates and their continuous-plane layout.
//!
//! Hexes use axial `(q, r)` coordinates. The third cube component is derived
//! (`y = -q - r`) whenever rounding or distance needs it.

use serde::{Deserialize, Serialize};

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Represents a point on the continuous plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns the euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Discrete axial hex coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Axial {
    pub q: i32,
    pub r: i32,
}

impl Axial {
    pub fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    pub fn to_cube(self) -> Cube {
        Cube::from_axial(self.q as f64, self.r as f64)
    }
}

/// Fractional cube coordinate. Valid cube coordinates satisfy `x + y + z = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Cube {
    pub fn from_axial(q: f64, r: f64) -> Self {
        Self {
            x: q,
            y: -q - r,
            z: r,
        }
    }

    pub fn lerp(&self, other: &Cube, t: f64) -> Cube {
        Cube {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    /// Rounds to the nearest integral cube coordinate.
    ///
    /// Each component is rounded on its own, then the one with the largest
    /// rounding error is rebuilt from the other two so the sum stays zero.
    pub fn round(&self) -> Cube {
        let mut rx = self.x.round();
        let mut ry = self.y.round();
        let mut rz = self.z.round();

        let x_diff = (rx - self.x).abs();
        let y_diff = (ry - self.y).abs();
        let z_diff = (rz - self.z).abs();

        if x_diff > y_diff && x_diff > z_diff {
            rx = -ry - rz;
        } else if y_diff > z_diff {
            ry = -rx - rz;
        } else {
            rz = -rx - ry;
        }

        Cube {
            x: rx,
            y: ry,
            z: rz,
        }
    }

    pub fn to_axial(self) -> Axial {
        Axial::new(self.x as i32, self.z as i32)
    }
}

/// Rounds fractional axial coordinates to the hex containing them.
pub fn axial_round(q: f64, r: f64) -> Axial {
    Cube::from_axial(q, r).round().to_axial()
}

/// Number of hex steps between two axial coordinates.
pub fn cube_distance(a: Axial, b: Axial) -> i32 {
    let (ca, cb) = (a.to_cube(), b.to_cube());
    let d = (ca.x - cb.x)
        .abs()
        .max((ca.y - cb.y).abs())
        .max((ca.z - cb.z).abs());
    d as i32
}

/// Walks the hexes on the straight line from `a` to `b`, both inclusive.
///
/// Samples `max(distance, 1) + 1` evenly spaced points; repeated consecutive
/// hexes are collapsed, so `hex_line(a, a)` is just `[a]`.
pub fn hex_line(a: Axial, b: Axial) -> Vec<Axial> {
    let distance = cube_distance(a, b).max(1);
    let (start, end) = (a.to_cube(), b.to_cube());
    let mut line: Vec<Axial> = (0..=distance)
        .map(|i| {
            let t = i as f64 / distance as f64;
            start.lerp(&end, t).round().to_axial()
        })
        .collect();
    line.dedup();
    line
}

/// Plane layout of hexes with circumradius `size`; each row shifts half a hex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexLayout {
    pub size: f64,
}

impl HexLayout {
    pub fn new(size: f64) -> Self {
        Self { size }
    }

    pub fn axial_to_pixel(&self, q: f64, r: f64) -> Point {
        Point {
            x: self.size * SQRT_3 * (q + r / 2.0),
            y: self.size * 1.5 * r,
        }
    }

    /// Inverse of [`HexLayout::axial_to_pixel`]; the result is fractional.
    pub fn pixel_to_axial(&self, x: f64, y: f64) -> (f64, f64) {
        let q = ((SQRT_3 / 3.0) * x - (1.0 / 3.0) * y) / self.size;
        let r = ((2.0 / 3.0) * y) / self.size;
        (q, r)
    }

    pub fn corners(&self, center: Point) -> [Point; 6] {
        let mut corners = [Point::default(); 6];
        for (i, corner) in corners.iter_mut().enumerate() {
            let angle = (60.0 * i as f64 - 30.0).to_radians();
            *corner = Point {
                x: center.x + self.size * angle.cos(),
                y: center.y + self.size * angle.sin(),
            };
        }
        corners
    }
}

/// Ray-casting point-in-polygon test.
pub fn point_in_polygon(corners: &[Point], x: f64, y: f64) -> bool {
    let mut inside = false;
    let mut j = corners.len().wrapping_sub(1);
    for i in 0..corners.len() {
        let (ci, cj) = (corners[i], corners[j]);
        let intersects =
            ((ci.y > y) != (cj.y > y)) && (x < (cj.x - ci.x) * (y - ci.y) / (cj.y - ci.y) + ci.x);
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_axial_to_pixel_origin_and_neighbors() {
        let layout = HexLayout::new(80.0);
        let origin = layout.axial_to_pixel(0.0, 0.0);
        assert_eq!(origin, Point::new(0.0, 0.0));

        let east = layout.axial_to_pixel(1.0, 0.0);
        assert_approx_eq!(east.x, 80.0 * SQRT_3, 1e-9);
        assert_approx_eq!(east.y, 0.0, 1e-9);

        let south = layout.axial_to_pixel(0.0, 1.0);
        assert_approx_eq!(south.x, 40.0 * SQRT_3, 1e-9);
        assert_approx_eq!(south.y, 120.0, 1e-9);
    }

    #[test]
    fn test_pixel_round_trip_reconstructs_axial() {
        let layout = HexLayout::new(80.0);
        for q in -12..=12 {
            for r in -12..=12 {
                let p = layout.axial_to_pixel(q as f64, r as f64);
                let (fq, fr) = layout.pixel_to_axial(p.x, p.y);
                assert_eq!(axial_round(fq, fr), Axial::new(q, r), "({}, {})", q, r);
            }
        }
    }

    #[test]
    fn test_cube_round_preserves_zero_sum() {
        let samples = [
            (0.3, 0.3),
            (0.5, 0.5),
            (-0.49, 1.51),
            (2.7, -1.2),
            (-3.33, -0.66),
            (10.01, 4.49),
        ];
        for (q, r) in samples {
            let cube = Cube::from_axial(q, r);
            assert_approx_eq!(cube.x + cube.y + cube.z, 0.0, 1e-12);
            let rounded = cube.round();
            assert_eq!(rounded.x + rounded.y + rounded.z, 0.0);
        }
    }

    #[test]
    fn test_axial_round_picks_nearest_hex() {
        assert_eq!(axial_round(0.1, 0.1), Axial::new(0, 0));
        assert_eq!(axial_round(0.9, -0.1), Axial::new(1, 0));
        assert_eq!(axial_round(-0.2, 1.1), Axial::new(0, 1));
    }

    #[test]
    fn test_cube_distance() {
        assert_eq!(cube_distance(Axial::new(0, 0), Axial::new(0, 0)), 0);
        assert_eq!(cube_distance(Axial::new(0, 0), Axial::new(3, 0)), 3);
        assert_eq!(cube_distance(Axial::new(1, 2), Axial::new(4, 0)), 3);
        assert_eq!(cube_distance(Axial::new(0, 0), Axial::new(-2, 4)), 4);
    }

    #[test]
    fn test_hex_line_to_self() {
        let a = Axial::new(2, 1);
        assert_eq!(hex_line(a, a), vec![a]);
    }

    #[test]
    fn test_hex_line_endpoints_and_steps() {
        let a = Axial::new(1, 2);
        let b = Axial::new(4, 0);
        let line = hex_line(a, b);
        assert_eq!(line.len(), 4);
        assert_eq!(line.first(), Some(&a));
        assert_eq!(line.last(), Some(&b));
        for pair in line.windows(2) {
            assert_eq!(cube_distance(pair[0], pair[1]), 1);
        }
    }

    #[test]
    fn test_hex_line_reverse_is_mirrored() {
        let pairs = [
            (Axial::new(0, 0), Axial::new(5, 3)),
            (Axial::new(1, 2), Axial::new(4, 0)),
            (Axial::new(5, 0), Axial::new(0, 3)),
        ];
        for (a, b) in pairs {
            let forward = hex_line(a, b);
            let backward = hex_line(b, a);
            assert_eq!(forward, backward.into_iter().rev().collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_corners_are_on_circumradius() {
        let layout = HexLayout::new(80.0);
        let center = Point::new(10.0, -4.0);
        for corner in layout.corners(center) {
            assert_approx_eq!(center.distance_to(&corner), 80.0, 1e-9);
        }
    }

    #[test]
    fn test_point_in_polygon() {
        let layout = HexLayout::new(80.0);
        let corners = layout.corners(Point::new(0.0, 0.0));
        assert!(point_in_polygon(&corners, 0.0, 0.0));
        assert!(point_in_polygon(&corners, 60.0, 0.0));
        assert!(!point_in_polygon(&corners, 75.0, 0.0));
        assert!(!point_in_polygon(&corners, 0.0, 85.0));
    }
}

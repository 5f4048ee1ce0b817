//! Geometric primitives for line outlines.

use imageproc::point::Point as ImageProcPoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X-coordinate of the point.
    pub x: f32,
    /// Y-coordinate of the point.
    pub y: f32,
}

impl Point {
    /// Creates a new point with the given coordinates.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Converts this point to an imageproc point, rounding to the nearest pixel.
    pub fn to_imageproc_point(&self) -> ImageProcPoint<i32> {
        ImageProcPoint::new(self.x.round() as i32, self.y.round() as i32)
    }
}

/// Axis-aligned integer rectangle in page pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A closed polygon outline, as stored in layout documents.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    /// Vertices in drawing order. The closing edge is implicit.
    pub points: Vec<Point>,
}

impl Polygon {
    /// Creates a polygon from its vertices.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Creates an axis-aligned rectangle.
    pub fn from_coords(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(vec![
            Point::new(x1, y1),
            Point::new(x2, y1),
            Point::new(x2, y2),
            Point::new(x1, y2),
        ])
    }

    /// Parses a PAGE-style point list: `"x1,y1 x2,y2 ..."`.
    pub fn parse_points(s: &str) -> Result<Self, String> {
        s.split_whitespace()
            .map(|pair| {
                let (x, y) = pair
                    .split_once(',')
                    .ok_or_else(|| format!("point '{pair}' is not of the form x,y"))?;
                let x: f32 = x
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid x coordinate in '{pair}'"))?;
                let y: f32 = y
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid y coordinate in '{pair}'"))?;
                if !x.is_finite() || !y.is_finite() {
                    return Err(format!("non-finite coordinate in '{pair}'"));
                }
                Ok(Point::new(x, y))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the polygon has no vertices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Calculates the area using the shoelace formula.
    ///
    /// Returns 0.0 for fewer than 3 points.
    pub fn area(&self) -> f32 {
        if self.points.len() < 3 {
            return 0.0;
        }

        let mut area = 0.0;
        let n = self.points.len();
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.points[i].x * self.points[j].y;
            area -= self.points[j].x * self.points[i].y;
        }
        area.abs() / 2.0
    }

    /// True when the outline has at least 3 points and a positive area.
    pub fn is_valid(&self) -> bool {
        self.points.len() >= 3 && self.area() > f32::EPSILON
    }

    /// Returns (min_x, min_y, max_x, max_y), or `None` for an empty polygon.
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.points.first()?;
        Some(self.points.iter().fold(
            (first.x, first.y, first.x, first.y),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        ))
    }

    /// Integer bounding box grown by `margin` and clipped to a `width` x `height` image.
    ///
    /// Returns `None` when nothing of the grown box lies inside the image.
    pub fn clipped_bbox(&self, margin: u32, width: u32, height: u32) -> Option<PixelRect> {
        let (x0, y0, x1, y1) = self.bounds()?;
        let margin = margin as f32;
        let left = (x0.floor() - margin).max(0.0);
        let top = (y0.floor() - margin).max(0.0);
        let right = (x1.ceil() + margin).min(width as f32);
        let bottom = (y1.ceil() + margin).min(height as f32);
        if right <= left || bottom <= top {
            return None;
        }
        Some(PixelRect {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }

    /// True if the polygon is an axis-aligned rectangle.
    pub fn is_axis_aligned_rect(&self) -> bool {
        let points = self.deduplicated();
        if points.len() != 4 {
            return false;
        }
        (0..4).all(|i| {
            let a = points[i];
            let b = points[(i + 1) % 4];
            a.x == b.x || a.y == b.y
        })
    }

    /// Vertices with consecutive duplicates and a repeated closing point removed.
    pub fn deduplicated(&self) -> Vec<Point> {
        let mut points: Vec<Point> = Vec::with_capacity(self.points.len());
        for p in &self.points {
            if points.last() != Some(p) {
                points.push(*p);
            }
        }
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        points
    }

    /// Returns a copy translated by (`dx`, `dy`).
    pub fn translated(&self, dx: f32, dy: f32) -> Polygon {
        Polygon::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x + dx, p.y + dy))
                .collect(),
        )
    }
}

impl fmt::Display for Polygon {
    /// Formats the polygon as a PAGE point list.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.points.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{},{}", p.x, p.y)?;
        }
        Ok(())
    }
}

//! Shape classification of detected objects
//!
//! Buckets each final object by polygon vertex count, roundness, aspect
//! ratio, and area into a named shape/size category for display and counting.

use imageproc::geometry::approximate_polygon_dp;

use crate::detect::Region;

/// Polygon approximation tolerance as a fraction of the perimeter
const APPROXIMATION_EPSILON: f64 = 0.01;

/// Area bounds for the size buckets (px²)
const SMALL_AREA: f64 = 1000.0;
const MEDIUM_AREA: f64 = 10000.0;

/// Shape classification
pub struct ShapeClassifier;

impl ShapeClassifier {
    /// Classify a region into a named shape/size bucket, e.g.
    /// "Medium Round Object"
    pub fn classify(region: &Region) -> String {
        let approximated = approximate_polygon_dp(
            &region.outline,
            APPROXIMATION_EPSILON * region.perimeter,
            true,
        );

        shape_label(
            approximated.len(),
            region.circularity,
            region.aspect_ratio,
            region.area,
        )
    }
}

fn size_bucket(area: f64) -> &'static str {
    if area < SMALL_AREA {
        "Small"
    } else if area < MEDIUM_AREA {
        "Medium"
    } else {
        "Large"
    }
}

fn shape_label(vertices: usize, roundness: f64, aspect_ratio: f64, area: f64) -> String {
    let bucket = size_bucket(area);

    let shape = if vertices == 4 {
        if aspect_ratio < 1.3 {
            "Square Object"
        } else if aspect_ratio < 3.0 {
            "Rectangular Object"
        } else {
            "Elongated Object"
        }
    } else if roundness > 0.7 {
        if aspect_ratio < 1.2 {
            "Round Object"
        } else {
            "Oval Object"
        }
    } else if vertices == 3 {
        "Triangular Object"
    } else if (5..=8).contains(&vertices) {
        "Polygonal Object"
    } else {
        "Irregular Object"
    };

    format!("{} {}", bucket, shape)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StrategyKind;
    use imageproc::point::Point;

    fn circle_region(radius: f64) -> Region {
        let outline: Vec<Point<i32>> = (0..32)
            .map(|i| {
                let angle = 2.0 * std::f64::consts::PI * i as f64 / 32.0;
                Point::new(
                    (100.0 + radius * angle.cos()).round() as i32,
                    (100.0 + radius * angle.sin()).round() as i32,
                )
            })
            .collect();
        Region::from_outline(outline, StrategyKind::Blob).unwrap()
    }

    #[test]
    fn test_disc_is_round() {
        let region = circle_region(20.0);
        let label = ShapeClassifier::classify(&region);
        assert_eq!(label, "Medium Round Object");
    }

    #[test]
    fn test_small_square() {
        let outline = vec![
            Point::new(0, 0),
            Point::new(20, 0),
            Point::new(20, 20),
            Point::new(0, 20),
        ];
        let region = Region::from_outline(outline, StrategyKind::Contour).unwrap();
        assert_eq!(ShapeClassifier::classify(&region), "Small Square Object");
    }

    #[test]
    fn test_rectangle() {
        let outline = vec![
            Point::new(0, 0),
            Point::new(80, 0),
            Point::new(80, 40),
            Point::new(0, 40),
        ];
        let region = Region::from_outline(outline, StrategyKind::Contour).unwrap();
        assert_eq!(ShapeClassifier::classify(&region), "Medium Rectangular Object");
    }

    #[test]
    fn test_elongated_bar() {
        let outline = vec![
            Point::new(0, 0),
            Point::new(120, 0),
            Point::new(120, 20),
            Point::new(0, 20),
        ];
        let region = Region::from_outline(outline, StrategyKind::Contour).unwrap();
        assert_eq!(ShapeClassifier::classify(&region), "Medium Elongated Object");
    }

    #[test]
    fn test_triangle() {
        let outline = vec![Point::new(0, 0), Point::new(40, 0), Point::new(20, 35)];
        let region = Region::from_outline(outline, StrategyKind::Contour).unwrap();
        let label = ShapeClassifier::classify(&region);
        assert_eq!(label, "Small Triangular Object");
    }

    #[test]
    fn test_size_buckets() {
        assert_eq!(size_bucket(500.0), "Small");
        assert_eq!(size_bucket(5000.0), "Medium");
        assert_eq!(size_bucket(50000.0), "Large");
    }

    #[test]
    fn test_irregular_fallback() {
        // Many vertices, low roundness
        let label = shape_label(12, 0.3, 1.5, 200.0);
        assert_eq!(label, "Small Irregular Object");
    }

    #[test]
    fn test_polygon_bucket() {
        let label = shape_label(6, 0.6, 1.1, 2000.0);
        assert_eq!(label, "Medium Polygonal Object");
    }
}

//! Clip boxes for coordinate-keyed streams.

use landchange_protocol::{BoundingBox, PixelCoordinate};

/// A point whose coordinates can be compared as real numbers.
pub trait PlanarPoint {
    fn planar(&self) -> (f64, f64);
}

impl PlanarPoint for PixelCoordinate {
    fn planar(&self) -> (f64, f64) {
        (self.x as f64, self.y as f64)
    }
}

macro_rules! impl_planar_tuple {
    ($($ty:ty),*) => {
        $(
            impl PlanarPoint for ($ty, $ty) {
                fn planar(&self) -> (f64, f64) {
                    (self.0 as f64, self.1 as f64)
                }
            }
        )*
    };
}

impl_planar_tuple!(i32, i64, f32, f64);

/// Whether `point` lies inside `bbox`, edges inclusive.
///
/// An absent box accepts every point.
pub fn fits_in_box<P: PlanarPoint + ?Sized>(point: &P, bbox: Option<&BoundingBox>) -> bool {
    let Some(bbox) = bbox else {
        return true;
    };
    let (x, y) = point.planar();
    x >= bbox.ulx && x <= bbox.lrx && y >= bbox.lry && y <= bbox.uly
}

/// Smallest box enclosing every point, or `None` when there are none.
pub fn minbox<I, P>(points: I) -> Option<BoundingBox>
where
    I: IntoIterator<Item = P>,
    P: PlanarPoint,
{
    points.into_iter().fold(None, |acc, point| {
        let (x, y) = point.planar();
        Some(match acc {
            None => BoundingBox::new(x, y, x, y),
            Some(b) => BoundingBox::new(b.ulx.min(x), b.uly.max(y), b.lrx.max(x), b.lry.min(y)),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit_box() -> BoundingBox {
        BoundingBox::new(0.0, 10.0, 10.0, 0.0)
    }

    #[test]
    fn edges_are_inclusive() {
        let b = unit_box();
        assert!(fits_in_box(&(5, 5), Some(&b)));
        assert!(!fits_in_box(&(-1, 5), Some(&b)));
        assert!(fits_in_box(&(5, 10), Some(&b)));
        assert!(!fits_in_box(&(5.0, -0.1), Some(&b)));
        assert!(fits_in_box(&(0.0, 0.0), Some(&b)));
        assert!(fits_in_box(&(10i64, 10i64), Some(&b)));
    }

    #[test]
    fn compares_as_reals_across_representations() {
        let b = BoundingBox::new(-0.5, 0.5, 0.5, -0.5);
        assert!(fits_in_box(&PixelCoordinate::new(0, 0), Some(&b)));
        assert!(fits_in_box(&(0.5f32, -0.5f32), Some(&b)));
        assert!(!fits_in_box(&(1i32, 0i32), Some(&b)));
    }

    #[test]
    fn minbox_encloses_chip_ids() {
        let chips: Vec<(i64, i64)> = vec![(-1821585, 2891595), (-1818585, 2888595)];
        let b = minbox(chips.clone()).unwrap();
        assert_eq!(b, BoundingBox::new(-1821585.0, 2891595.0, -1818585.0, 2888595.0));
        assert!(b.is_well_formed());
        for chip in &chips {
            assert!(fits_in_box(chip, Some(&b)));
        }
    }

    #[test]
    fn minbox_of_nothing_is_none() {
        assert_eq!(minbox(Vec::<(i64, i64)>::new()), None);
    }

    proptest! {
        #[test]
        fn prop_absent_box_accepts_everything(x in any::<i64>(), y in any::<i64>()) {
            prop_assert!(fits_in_box(&PixelCoordinate::new(x, y), None));
        }

        #[test]
        fn prop_minbox_contains_every_point(
            points in proptest::collection::vec((-1_000_000i64..1_000_000, -1_000_000i64..1_000_000), 1..40)
        ) {
            let b = minbox(points.iter().copied()).unwrap();
            prop_assert!(b.is_well_formed());
            for point in &points {
                prop_assert!(fits_in_box(point, Some(&b)));
            }
        }
    }
}

//! Property-based checks of the core invariants.

use proptest::prelude::*;
use terrain_model::{
    cleaning::remove_duplicates,
    dataset::{calculate_bounds, BoundingBox},
    interpolation::{interpolate_idw, interpolate_idw_grid, GridConfig, IdwConfig},
    SurveyPoint,
};

fn arb_point() -> impl Strategy<Value = (f64, f64, f64)> {
    (-1000.0..1000.0f64, -1000.0..1000.0f64, -50.0..500.0f64)
}

fn arb_points(max: usize) -> impl Strategy<Value = Vec<SurveyPoint>> {
    prop::collection::vec(arb_point(), 1..max).prop_map(|coords| {
        coords
            .into_iter()
            .enumerate()
            .map(|(i, (x, y, z))| SurveyPoint::new(i.to_string(), x, y, z))
            .collect()
    })
}

proptest! {
    #[test]
    fn idw_returns_sample_elevation(points in arb_points(40), power in 0.5..4.0f64) {
        let cfg = IdwConfig::default().with_power(power).with_search_radius(100.0);
        let p = &points[0];
        prop_assert_eq!(interpolate_idw(p.x, p.y, &points, &cfg), Some(p.z));
    }

    #[test]
    fn dedup_second_pass_removes_nothing(points in arb_points(60), tol in 0.001..50.0f64) {
        let mut doubled = points.clone();
        doubled.extend(points.iter().cloned());
        let once = remove_duplicates(&doubled, tol);
        prop_assert!(once.removed_count >= points.len());
        prop_assert_eq!(remove_duplicates(&once.points, tol).removed_count, 0);
    }

    #[test]
    fn bounds_contain_every_point(points in arb_points(80)) {
        let b = calculate_bounds(&points).unwrap();
        for p in &points {
            prop_assert!(b.min_x <= p.x && p.x <= b.max_x);
            prop_assert!(b.min_y <= p.y && p.y <= b.max_y);
            prop_assert!(b.min_z <= p.z && p.z <= b.max_z);
        }
    }

    #[test]
    fn grid_length_matches_dimensions(
        points in arb_points(20),
        w in 1.0..60.0f64,
        h in 1.0..60.0f64,
        res in 0.5..10.0f64,
    ) {
        let grid_cfg = GridConfig::covering(BoundingBox::new(0.0, 0.0, w, h), res);
        let grid = interpolate_idw_grid(&points, &grid_cfg, &IdwConfig::default(), None).unwrap();
        prop_assert_eq!(grid.values.len(), grid.width * grid.height);
        prop_assert_eq!(grid.width, (w / res).ceil() as usize);
        prop_assert_eq!(
            grid.statistics.valid_cells + grid.statistics.invalid_cells,
            grid.values.len()
        );
    }
}

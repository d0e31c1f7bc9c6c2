use matseg::models::Mask;
use matseg::stats::*;
use speculate2::speculate;

/// Build a mask from rows of `#` (foreground) and `.` (background).
fn ascii(rows: &[&str]) -> Mask {
    let height = rows.len() as u32;
    let width = rows[0].len() as u32;
    Mask::from_fn(width, height, 1, |x, y| rows[y as usize].as_bytes()[x as usize] == b'#').unwrap()
}

speculate! {
    before {
        let reducer = StatsReducer::default().with_min_object_pixels(1);
    }

    describe "compute" {
        it "reports the foreground share as a percentage" {
            let mask = ascii(&[
                "##..",
                "##..",
                "....",
                "....",
            ]);
            let stats = reducer.compute(&mask);

            assert_eq!(stats.area_fraction_percent, 25.0);
            assert_eq!(stats.object_count, 1);
            assert_eq!(stats.mean_object_area, 4.0);
        }

        it "joins pixels that touch only at a corner" {
            let mask = ascii(&[
                "#...",
                ".#..",
                "..#.",
                "...#",
            ]);
            assert_eq!(reducer.compute(&mask).object_count, 1);
        }

        it "separates blobs with a background gap" {
            let mask = ascii(&[
                "##.#",
                "##..",
                "....",
                "#..#",
            ]);
            let stats = reducer.compute(&mask);

            assert_eq!(stats.object_count, 4);
            assert_eq!(stats.mean_object_area, 1.75);
        }

        it "returns zeros for an empty mask" {
            let mask = Mask::filled(8, 8, 0, 1).unwrap();
            let stats = reducer.compute(&mask);

            assert_eq!(stats.area_fraction_percent, 0.0);
            assert_eq!(stats.object_count, 0);
            assert_eq!(stats.mean_object_area, 0.0);
        }

        it "treats any non-zero label as foreground" {
            let mask = Mask::new(2, 2, vec![0, 3, 255, 0], 1).unwrap();
            let stats = reducer.compute(&mask);

            assert_eq!(stats.area_fraction_percent, 50.0);
            assert_eq!(stats.object_count, 1);
        }

        it "is deterministic" {
            let mask = ascii(&[
                "#.#.#",
                ".....",
                "###.#",
            ]);
            assert_eq!(reducer.compute(&mask), reducer.compute(&mask));
        }
    }

    describe "noise threshold" {
        it "drops components below the minimum but keeps their pixels in the area" {
            let mask = ascii(&[
                "###.....",
                "###....#",
                "###.....",
            ]);
            let stats = StatsReducer::default().with_min_object_pixels(5).compute(&mask);

            assert_eq!(stats.object_count, 1);
            assert!((stats.area_fraction_percent - 1000.0 / 24.0).abs() < 1e-9);
            assert_eq!(stats.mean_object_area, 10.0);
        }

        it "defaults to ten pixels" {
            assert_eq!(StatsReducer::default().min_object_pixels(), DEFAULT_MIN_OBJECT_PIXELS);
            assert_eq!(DEFAULT_MIN_OBJECT_PIXELS, 10);

            let mask = ascii(&["#########"]);
            assert_eq!(StatsReducer::default().compute(&mask).object_count, 0);
        }
    }

    describe "pixel area" {
        it "scales object areas into physical units" {
            let mask = ascii(&[
                "##...#",
                "##...#",
            ]);
            let reducer = StatsReducer::new(1, 0.25).unwrap();

            assert_eq!(reducer.compute(&mask).mean_object_area, 0.75);
            assert_eq!(reducer.object_areas(&mask), vec![1.0, 0.5]);
        }
    }

    describe "invalid pixel area" {
        it "is rejected before it can produce negative areas" {
            assert_eq!(
                StatsReducer::default().with_pixel_area(-2.0),
                Err(StatsError::InvalidPixelArea(-2.0))
            );
            assert!(StatsReducer::new(10, f64::NAN).is_err());
        }
    }

    describe "component_areas" {
        it "lists components in scan order" {
            let mask = ascii(&[
                ".#..##",
                "....##",
                "#.....",
            ]);
            assert_eq!(component_areas(&mask), vec![1, 4, 1]);
        }
    }
}

use citynav::navigation::{
    path_cost, GridCell, Heuristic, HierarchicalSearch, SearchAlgorithm, SearchOptions, SingleLevelSearch, WalkabilityGrid,
};

fn four_connected() -> SearchOptions {
    SearchOptions { allow_diagonal: false, algorithm: SearchAlgorithm::AStar, ..Default::default() }
}

/// 96x96 grid of nested square walls, each with one two-cell gap on
/// alternating sides, so the centre is only reachable by winding inwards
/// through every 32x32 cluster.
fn spiral_grid() -> WalkabilityGrid {
    let size = 96;
    let mut grid = WalkabilityGrid::open(size, size);
    for ring in 1..=7 {
        let lo = ring * 6;
        let hi = size - 1 - lo;
        for i in lo..=hi {
            grid.set_walkable(i, lo, false);
            grid.set_walkable(i, hi, false);
            grid.set_walkable(lo, i, false);
            grid.set_walkable(hi, i, false);
        }
        let gap_x = if ring % 2 == 0 { lo } else { hi };
        grid.set_walkable(gap_x, 47, true);
        grid.set_walkable(gap_x, 48, true);
    }
    grid
}

fn random_grid(rng: &mut fastrand::Rng, size: usize, density: f64) -> WalkabilityGrid {
    let mut grid = WalkabilityGrid::open(size, size);
    for y in 0..size {
        for x in 0..size {
            if rng.f64() < density {
                grid.set_walkable(x, y, false);
            }
        }
    }
    grid
}

fn random_walkable(rng: &mut fastrand::Rng, grid: &WalkabilityGrid) -> GridCell {
    loop {
        let cell = GridCell::new(rng.usize(0..grid.width), rng.usize(0..grid.height));
        if grid.is_walkable_cell(cell) {
            return cell;
        }
    }
}

fn assert_valid_four_connected(grid: &WalkabilityGrid, cells: &[GridCell]) {
    for c in cells {
        assert!(grid.is_walkable_cell(*c), "path crosses blocked cell {:?}", c);
    }
    for w in cells.windows(2) {
        assert_eq!(w[0].manhattan(w[1]), 1, "non-adjacent step {:?} -> {:?}", w[0], w[1]);
    }
}

#[test]
fn test_spiral_matches_brute_force() {
    let grid = spiral_grid();
    let hpa = HierarchicalSearch::new(grid.clone(), 32, four_connected(), true);
    let brute = SingleLevelSearch::new(four_connected());

    let start = GridCell::new(0, 0);
    let end = GridCell::new(48, 48);
    let expected = brute.find_cells(&grid, start, end).expect("spiral centre is reachable");
    let actual = hpa.find_path_cells(start, end).expect("hierarchical search finds the centre");

    assert_valid_four_connected(&grid, &actual);
    assert_eq!(actual.first(), Some(&start));
    assert_eq!(actual.last(), Some(&end));
    assert_eq!(path_cost(&actual), path_cost(&expected));
    // the corridor forces a long detour
    assert!(actual.len() > 4 * start.manhattan(end), "suspiciously short: {}", actual.len());
}

#[test]
fn test_spiral_both_directions() {
    let grid = spiral_grid();
    let hpa = HierarchicalSearch::new(grid, 32, four_connected(), true);
    let a = GridCell::new(3, 90);
    let b = GridCell::new(50, 45);
    let there = hpa.find_path_cells(a, b).unwrap();
    let back = hpa.find_path_cells(b, a).unwrap();
    assert_eq!(path_cost(&there), path_cost(&back));
}

#[test]
fn test_spiral_sealed_centre_is_unreachable() {
    let mut grid = spiral_grid();
    // close the innermost gap
    let lo = 7 * 6;
    let hi = 95 - lo;
    grid.set_walkable(hi, 47, false);
    grid.set_walkable(hi, 48, false);
    let hpa = HierarchicalSearch::new(grid, 32, four_connected(), true);
    assert!(hpa.find_path_cells(GridCell::new(0, 0), GridCell::new(48, 48)).is_none());
    assert!(!hpa.connected(GridCell::new(0, 0), GridCell::new(48, 48)));
}

#[test]
fn test_random_grids_match_brute_force() {
    let brute = SingleLevelSearch::new(four_connected());
    for seed in 0..4u64 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let grid = random_grid(&mut rng, 80, 0.25);
        let hpa = HierarchicalSearch::new(grid.clone(), 16, four_connected(), true);

        for _ in 0..40 {
            let a = random_walkable(&mut rng, &grid);
            let b = random_walkable(&mut rng, &grid);
            let expected = brute.find_cells(&grid, a, b);
            let actual = hpa.find_path_cells(a, b);
            match (expected, actual) {
                (None, None) => {}
                (Some(expected), Some(actual)) => {
                    assert_valid_four_connected(&grid, &actual);
                    assert_eq!(
                        path_cost(&actual),
                        path_cost(&expected),
                        "seed {} query {:?} -> {:?}",
                        seed,
                        a,
                        b
                    );
                }
                (expected, actual) => panic!(
                    "seed {} query {:?} -> {:?}: brute force found {}, hierarchical found {}",
                    seed,
                    a,
                    b,
                    expected.is_some(),
                    actual.is_some()
                ),
            }
        }
    }
}

#[test]
fn test_diagonal_paths_are_valid_and_never_shorter() {
    let options = SearchOptions { heuristic: Heuristic::Octile, ..Default::default() };
    let brute = SingleLevelSearch::new(options);
    let mut rng = fastrand::Rng::with_seed(11);
    let grid = random_grid(&mut rng, 64, 0.2);
    let hpa = HierarchicalSearch::new(grid.clone(), 16, options, true);

    for _ in 0..30 {
        let a = random_walkable(&mut rng, &grid);
        let b = random_walkable(&mut rng, &grid);
        let expected = brute.find_cells(&grid, a, b);
        let actual = hpa.find_path_cells(a, b);
        assert_eq!(expected.is_some(), actual.is_some(), "{:?} -> {:?}", a, b);
        let (Some(expected), Some(actual)) = (expected, actual) else { continue };
        for w in actual.windows(2) {
            let (p, q) = (w[0], w[1]);
            assert_eq!(p.chebyshev(q), 1, "non-adjacent step {:?} -> {:?}", p, q);
            if p.x != q.x && p.y != q.y {
                assert!(grid.is_walkable(q.x, p.y) && grid.is_walkable(p.x, q.y), "corner cut at {:?} -> {:?}", p, q);
            }
        }
        assert!(path_cost(&actual) >= path_cost(&expected));
    }
}

//! Single-level grid search (A* and jump point search).
//!
//! The grid buffer is shared and only ever read. Each query owns its working
//! state (open heap, closed bitset, g-scores and parents), so any number of
//! queries can run against the same grid from different threads.

use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::BinaryHeap;
use super::config::{Heuristic, NavigationConfig, SearchAlgorithm};
use super::grid::WalkabilityGrid;
use super::math::{self, FixedNum};
use super::types::{CellRect, GridCell, State};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchOptions {
    /// 8-connected movement. Corners are never cut: a diagonal step needs
    /// both orthogonal neighbours walkable.
    pub allow_diagonal: bool,
    pub heuristic: Heuristic,
    pub algorithm: SearchAlgorithm,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            allow_diagonal: true,
            heuristic: Heuristic::Manhattan,
            algorithm: SearchAlgorithm::JumpPoint,
        }
    }
}

impl SearchOptions {
    pub fn from_config(config: &NavigationConfig) -> Self {
        Self {
            allow_diagonal: config.allow_diagonal,
            heuristic: config.heuristic,
            algorithm: config.search_algorithm,
        }
    }

    #[inline]
    fn uses_jump_points(&self) -> bool {
        self.algorithm == SearchAlgorithm::JumpPoint && self.allow_diagonal
    }

    #[inline]
    fn estimate(&self, x: i64, y: i64, goal: (i64, i64)) -> FixedNum {
        let dx = x.abs_diff(goal.0) as usize;
        let dy = y.abs_diff(goal.1) as usize;
        match self.heuristic {
            Heuristic::Manhattan => math::manhattan(dx, dy),
            Heuristic::Octile => math::octile(dx, dy),
            Heuristic::Chebyshev => math::chebyshev(dx, dy),
            Heuristic::Euclidean => math::euclidean(dx, dy),
        }
    }
}

/// Read-only window onto a grid. Cells outside the window are blocked;
/// `forced` cells are walkable whatever the grid says.
struct GridView<'a> {
    grid: &'a WalkabilityGrid,
    window: CellRect,
    forced: [Option<GridCell>; 2],
}

impl<'a> GridView<'a> {
    #[inline]
    fn walkable(&self, x: i64, y: i64) -> bool {
        if x < self.window.min_x as i64
            || y < self.window.min_y as i64
            || x > self.window.max_x as i64
            || y > self.window.max_y as i64
        {
            return false;
        }
        let (ux, uy) = (x as usize, y as usize);
        if self.forced.iter().flatten().any(|c| c.x == ux && c.y == uy) {
            return true;
        }
        self.grid.is_walkable(ux, uy)
    }

    #[inline]
    fn index(&self, x: i64, y: i64) -> usize {
        (y as usize - self.window.min_y) * self.window.width() + (x as usize - self.window.min_x)
    }

    #[inline]
    fn coords(&self, idx: usize) -> (i64, i64) {
        let w = self.window.width();
        ((self.window.min_x + idx % w) as i64, (self.window.min_y + idx / w) as i64)
    }

    /// Direct neighbours of a cell.
    fn neighbors(&self, x: i64, y: i64, allow_diagonal: bool, out: &mut SmallVec<[(i64, i64); 8]>) {
        let n = self.walkable(x, y - 1);
        let s = self.walkable(x, y + 1);
        let w = self.walkable(x - 1, y);
        let e = self.walkable(x + 1, y);
        if n { out.push((x, y - 1)); }
        if e { out.push((x + 1, y)); }
        if s { out.push((x, y + 1)); }
        if w { out.push((x - 1, y)); }
        if !allow_diagonal {
            return;
        }
        if n && w && self.walkable(x - 1, y - 1) { out.push((x - 1, y - 1)); }
        if n && e && self.walkable(x + 1, y - 1) { out.push((x + 1, y - 1)); }
        if s && e && self.walkable(x + 1, y + 1) { out.push((x + 1, y + 1)); }
        if s && w && self.walkable(x - 1, y + 1) { out.push((x - 1, y + 1)); }
    }

    /// Neighbours worth jumping towards, given the direction we arrived from.
    fn pruned_neighbors(&self, x: i64, y: i64, parent: Option<(i64, i64)>, out: &mut SmallVec<[(i64, i64); 8]>) {
        let Some((px, py)) = parent else {
            self.neighbors(x, y, true, out);
            return;
        };
        let dx = (x - px).signum();
        let dy = (y - py).signum();

        if dx != 0 && dy != 0 {
            let vertical = self.walkable(x, y + dy);
            let horizontal = self.walkable(x + dx, y);
            if vertical { out.push((x, y + dy)); }
            if horizontal { out.push((x + dx, y)); }
            if vertical && horizontal && self.walkable(x + dx, y + dy) {
                out.push((x + dx, y + dy));
            }
        } else if dx != 0 {
            let next = self.walkable(x + dx, y);
            let up = self.walkable(x, y + 1);
            let down = self.walkable(x, y - 1);
            if next {
                out.push((x + dx, y));
                if up && self.walkable(x + dx, y + 1) { out.push((x + dx, y + 1)); }
                if down && self.walkable(x + dx, y - 1) { out.push((x + dx, y - 1)); }
            }
            if up { out.push((x, y + 1)); }
            if down { out.push((x, y - 1)); }
        } else {
            let next = self.walkable(x, y + dy);
            let right = self.walkable(x + 1, y);
            let left = self.walkable(x - 1, y);
            if next {
                out.push((x, y + dy));
                if right && self.walkable(x + 1, y + dy) { out.push((x + 1, y + dy)); }
                if left && self.walkable(x - 1, y + dy) { out.push((x - 1, y + dy)); }
            }
            if right { out.push((x + 1, y)); }
            if left { out.push((x - 1, y)); }
        }
    }

    /// Walk a straight line until a jump point, the goal, or a wall.
    fn jump_straight(&self, mut x: i64, mut y: i64, dx: i64, dy: i64, goal: (i64, i64)) -> Option<(i64, i64)> {
        loop {
            if !self.walkable(x, y) {
                return None;
            }
            if (x, y) == goal {
                return Some((x, y));
            }
            let forced = if dx != 0 {
                (self.walkable(x, y - 1) && !self.walkable(x - dx, y - 1))
                    || (self.walkable(x, y + 1) && !self.walkable(x - dx, y + 1))
            } else {
                (self.walkable(x - 1, y) && !self.walkable(x - 1, y - dy))
                    || (self.walkable(x + 1, y) && !self.walkable(x + 1, y - dy))
            };
            if forced {
                return Some((x, y));
            }
            x += dx;
            y += dy;
        }
    }

    /// Walk a diagonal until a cell from which a straight jump succeeds.
    fn jump_diagonal(&self, mut x: i64, mut y: i64, dx: i64, dy: i64, goal: (i64, i64)) -> Option<(i64, i64)> {
        loop {
            if !self.walkable(x, y) {
                return None;
            }
            if (x, y) == goal {
                return Some((x, y));
            }
            if self.jump_straight(x + dx, y, dx, 0, goal).is_some()
                || self.jump_straight(x, y + dy, 0, dy, goal).is_some()
            {
                return Some((x, y));
            }
            if !(self.walkable(x + dx, y) && self.walkable(x, y + dy)) {
                return None;
            }
            x += dx;
            y += dy;
        }
    }

    fn jump(&self, from: (i64, i64), to: (i64, i64), goal: (i64, i64)) -> Option<(i64, i64)> {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        if dx != 0 && dy != 0 {
            self.jump_diagonal(to.0, to.1, dx, dy, goal)
        } else {
            self.jump_straight(to.0, to.1, dx, dy, goal)
        }
    }
}

/// Grid path finder used both on whole grids and on cluster windows.
///
/// # Algorithm
///
/// - **Jump point search** (default, 8-connected): straight and diagonal
///   jumps skip symmetric runs of open cells; only jump points enter the open
///   set. The jump point chain is expanded back into every cell on the way.
/// - **A\*** (4-connected, or when selected explicitly): plain expansion of
///   direct neighbours.
///
/// Step costs are 1 orthogonal and √2 diagonal in `FixedNum`. Nodes are
/// re-opened when a cheaper route turns up, so inadmissible heuristics
/// (Manhattan with diagonals) still terminate with a valid path.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleLevelSearch {
    pub options: SearchOptions,
}

impl SingleLevelSearch {
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }

    /// Path between two cells of the full grid, as cell centres in world
    /// space. `None` when either endpoint is blocked or no path exists.
    pub fn find_path_raw(&self, grid: &WalkabilityGrid, start: GridCell, end: GridCell) -> Option<Vec<Vec3>> {
        self.find_cells(grid, start, end)
            .map(|cells| cells_to_world(grid, &cells))
    }

    /// Cell path on the full grid.
    pub fn find_cells(&self, grid: &WalkabilityGrid, start: GridCell, end: GridCell) -> Option<Vec<GridCell>> {
        let window = grid.bounds()?;
        self.find_cells_in(grid, window, start, end, false)
    }

    /// Cell path restricted to `window`. With `force_endpoints`, `start` and
    /// `end` count as walkable even when the grid blocks them.
    pub fn find_cells_in(
        &self,
        grid: &WalkabilityGrid,
        window: CellRect,
        start: GridCell,
        end: GridCell,
        force_endpoints: bool,
    ) -> Option<Vec<GridCell>> {
        if window.max_x >= grid.width || window.max_y >= grid.height {
            return None;
        }
        if !window.contains(start) || !window.contains(end) {
            return None;
        }
        let view = GridView {
            grid,
            window,
            forced: if force_endpoints { [Some(start), Some(end)] } else { [None, None] },
        };
        let (sx, sy) = (start.x as i64, start.y as i64);
        let goal = (end.x as i64, end.y as i64);
        if !view.walkable(sx, sy) || !view.walkable(goal.0, goal.1) {
            return None;
        }
        if start == end {
            return Some(vec![start]);
        }

        let jps = self.options.uses_jump_points();
        let start_idx = view.index(sx, sy);
        let goal_idx = view.index(goal.0, goal.1);

        let mut open = BinaryHeap::new();
        let mut closed = FixedBitSet::with_capacity(window.area());
        let mut g_score: FxHashMap<usize, FixedNum> = FxHashMap::default();
        let mut came_from: FxHashMap<usize, usize> = FxHashMap::default();

        g_score.insert(start_idx, FixedNum::ZERO);
        open.push(State { cost: self.options.estimate(sx, sy, goal), g: FixedNum::ZERO, node: start_idx });

        let mut successors: SmallVec<[(i64, i64); 8]> = SmallVec::new();
        let mut candidates: SmallVec<[(i64, i64); 8]> = SmallVec::new();

        while let Some(State { g, node, .. }) = open.pop() {
            if closed.contains(node) || g > g_score.get(&node).copied().unwrap_or(FixedNum::MAX) {
                continue;
            }
            if node == goal_idx {
                return Some(reconstruct(&view, &came_from, start_idx, goal_idx));
            }
            closed.insert(node);

            let (x, y) = view.coords(node);
            successors.clear();
            if jps {
                let parent = came_from.get(&node).map(|&p| view.coords(p));
                candidates.clear();
                view.pruned_neighbors(x, y, parent, &mut candidates);
                for &next in &candidates {
                    if let Some(jp) = view.jump((x, y), next, goal) {
                        successors.push(jp);
                    }
                }
            } else {
                view.neighbors(x, y, self.options.allow_diagonal, &mut successors);
            }

            for &(nx, ny) in &successors {
                let idx = view.index(nx, ny);
                let step = math::octile(nx.abs_diff(x) as usize, ny.abs_diff(y) as usize);
                let tentative = g + step;
                if tentative < g_score.get(&idx).copied().unwrap_or(FixedNum::MAX) {
                    g_score.insert(idx, tentative);
                    came_from.insert(idx, node);
                    closed.set(idx, false);
                    open.push(State {
                        cost: tentative + self.options.estimate(nx, ny, goal),
                        g: tentative,
                        node: idx,
                    });
                }
            }
        }

        None
    }
}

/// Follow parents back from the goal and expand jumps into unit steps.
fn reconstruct(view: &GridView, came_from: &FxHashMap<usize, usize>, start: usize, goal: usize) -> Vec<GridCell> {
    let mut chain = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&prev) => {
                chain.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    chain.reverse();

    let mut cells = Vec::with_capacity(chain.len() * 2);
    let (x0, y0) = view.coords(chain[0]);
    cells.push(GridCell::new(x0 as usize, y0 as usize));
    for pair in chain.windows(2) {
        let (mut x, mut y) = view.coords(pair[0]);
        let (tx, ty) = view.coords(pair[1]);
        let dx = (tx - x).signum();
        let dy = (ty - y).signum();
        while (x, y) != (tx, ty) {
            x += dx;
            y += dy;
            cells.push(GridCell::new(x as usize, y as usize));
        }
    }
    cells
}

/// Octile cost of walking a cell path.
pub fn path_cost(cells: &[GridCell]) -> FixedNum {
    cells
        .windows(2)
        .map(|w| math::octile(w[0].x.abs_diff(w[1].x), w[0].y.abs_diff(w[1].y)))
        .fold(FixedNum::ZERO, |acc, c| acc + c)
}

/// Cell centres at the grid's domain height.
pub fn cells_to_world(grid: &WalkabilityGrid, cells: &[GridCell]) -> Vec<Vec3> {
    cells.iter().map(|&c| grid.grid_to_world(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid_path(grid: &WalkabilityGrid, cells: &[GridCell], allow_diagonal: bool) {
        for c in cells {
            assert!(grid.is_walkable_cell(*c), "path crosses blocked cell {:?}", c);
        }
        for w in cells.windows(2) {
            let (a, b) = (w[0], w[1]);
            let dx = a.x.abs_diff(b.x);
            let dy = a.y.abs_diff(b.y);
            assert!(dx <= 1 && dy <= 1 && dx + dy > 0, "non-adjacent step {:?} -> {:?}", a, b);
            if dx == 1 && dy == 1 {
                assert!(allow_diagonal, "diagonal step in 4-connected search");
                assert!(grid.is_walkable(a.x, b.y) && grid.is_walkable(b.x, a.y), "corner cut at {:?} -> {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_open_grid_diagonal() {
        let grid = WalkabilityGrid::open(10, 10);
        let search = SingleLevelSearch::default();
        let cells = search.find_cells(&grid, GridCell::new(0, 0), GridCell::new(9, 9)).unwrap();
        assert_eq!(cells.len(), 10);
        assert_valid_path(&grid, &cells, true);
        let cost = path_cost(&cells).to_num::<f32>();
        assert!((cost - 9.0 * std::f32::consts::SQRT_2).abs() < 1e-3);
    }

    #[test]
    fn test_open_grid_four_connected() {
        let grid = WalkabilityGrid::open(10, 10);
        let search = SingleLevelSearch::new(SearchOptions { allow_diagonal: false, ..Default::default() });
        let cells = search.find_cells(&grid, GridCell::new(0, 0), GridCell::new(9, 9)).unwrap();
        assert_eq!(cells.len(), 19);
        assert_eq!(path_cost(&cells), FixedNum::from_num(18));
        assert_valid_path(&grid, &cells, false);
    }

    #[test]
    fn test_same_cell() {
        let grid = WalkabilityGrid::open(3, 3);
        let search = SingleLevelSearch::default();
        let path = search.find_path_raw(&grid, GridCell::new(1, 1), GridCell::new(1, 1)).unwrap();
        assert_eq!(path, vec![grid.grid_to_world(GridCell::new(1, 1))]);
    }

    #[test]
    fn test_wall_without_opening() {
        let grid = WalkabilityGrid::from_ascii(&[
            "....#....",
            "....#....",
            "....#....",
            "....#....",
        ]);
        for algorithm in [SearchAlgorithm::JumpPoint, SearchAlgorithm::AStar] {
            let search = SingleLevelSearch::new(SearchOptions { algorithm, ..Default::default() });
            assert!(search.find_cells(&grid, GridCell::new(0, 0), GridCell::new(8, 3)).is_none());
        }
    }

    #[test]
    fn test_blocked_endpoint() {
        let grid = WalkabilityGrid::from_ascii(&["..#", "..."]);
        let search = SingleLevelSearch::default();
        assert!(search.find_cells(&grid, GridCell::new(0, 0), GridCell::new(2, 0)).is_none());
    }

    #[test]
    fn test_no_corner_cutting() {
        // the only diagonal squeeze between (1,0) and (2,1) is blocked on both sides
        let grid = WalkabilityGrid::from_ascii(&[
            ".#...",
            "..#..",
            "#....",
        ]);
        for algorithm in [SearchAlgorithm::JumpPoint, SearchAlgorithm::AStar] {
            let search = SingleLevelSearch::new(SearchOptions { algorithm, ..Default::default() });
            let cells = search.find_cells(&grid, GridCell::new(0, 0), GridCell::new(4, 0)).unwrap();
            assert_valid_path(&grid, &cells, true);
        }
    }

    #[test]
    fn test_jump_point_matches_astar_cost() {
        let grid = WalkabilityGrid::from_ascii(&[
            "................",
            "..######........",
            "..#......####...",
            "..#.####....#...",
            "..#....#....#...",
            "..####.#..###...",
            ".......#........",
            "########.#####..",
            "................",
        ]);
        let jps = SingleLevelSearch::new(SearchOptions { heuristic: Heuristic::Octile, ..Default::default() });
        let astar = SingleLevelSearch::new(SearchOptions {
            heuristic: Heuristic::Octile,
            algorithm: SearchAlgorithm::AStar,
            ..Default::default()
        });
        let pairs = [
            (GridCell::new(0, 0), GridCell::new(15, 8)),
            (GridCell::new(3, 4), GridCell::new(0, 8)),
            (GridCell::new(9, 3), GridCell::new(14, 1)),
            (GridCell::new(5, 2), GridCell::new(8, 8)),
        ];
        for (a, b) in pairs {
            let p1 = jps.find_cells(&grid, a, b).unwrap();
            let p2 = astar.find_cells(&grid, a, b).unwrap();
            assert_valid_path(&grid, &p1, true);
            assert_valid_path(&grid, &p2, true);
            assert_eq!(path_cost(&p1), path_cost(&p2), "cost mismatch for {:?} -> {:?}", a, b);
            assert_eq!(p1.first(), Some(&a));
            assert_eq!(p1.last(), Some(&b));
        }
    }

    #[test]
    fn test_window_and_forced_endpoints() {
        let grid = WalkabilityGrid::from_ascii(&[
            "#....",
            ".....",
            ".....",
        ]);
        let search = SingleLevelSearch::default();
        let window = CellRect::new(0, 0, 2, 2);
        // (0,0) is blocked but forced
        let cells = search
            .find_cells_in(&grid, window, GridCell::new(0, 0), GridCell::new(2, 2), true)
            .unwrap();
        assert_eq!(cells.first(), Some(&GridCell::new(0, 0)));
        assert!(cells.iter().all(|c| window.contains(*c)));
        // outside the window
        assert!(search.find_cells_in(&grid, window, GridCell::new(1, 1), GridCell::new(4, 1), true).is_none());
        // not forced
        assert!(search.find_cells_in(&grid, window, GridCell::new(0, 0), GridCell::new(2, 2), false).is_none());
    }

    #[test]
    fn test_random_grids_jps_vs_astar() {
        let mut rng = fastrand::Rng::with_seed(7);
        let jps = SingleLevelSearch::new(SearchOptions { heuristic: Heuristic::Octile, ..Default::default() });
        let astar = SingleLevelSearch::new(SearchOptions {
            heuristic: Heuristic::Octile,
            algorithm: SearchAlgorithm::AStar,
            ..Default::default()
        });
        for _ in 0..20 {
            let mut grid = WalkabilityGrid::open(24, 24);
            for _ in 0..150 {
                grid.set_walkable(rng.usize(0..24), rng.usize(0..24), false);
            }
            let a = GridCell::new(rng.usize(0..24), rng.usize(0..24));
            let b = GridCell::new(rng.usize(0..24), rng.usize(0..24));
            let p1 = jps.find_cells(&grid, a, b);
            let p2 = astar.find_cells(&grid, a, b);
            assert_eq!(p1.is_some(), p2.is_some());
            if let (Some(p1), Some(p2)) = (p1, p2) {
                assert_valid_path(&grid, &p1, true);
                assert_eq!(path_cost(&p1), path_cost(&p2));
            }
        }
    }

    /// Two-wide corridor folded back and forth across a `size` x `size` grid:
    /// a wall on every third row, open at alternating ends.
    fn serpentine(size: usize) -> WalkabilityGrid {
        let mut grid = WalkabilityGrid::open(size, size);
        for (k, y) in (2..size).step_by(3).enumerate() {
            let gap = if k % 2 == 0 { size - 1 } else { 0 };
            for x in 0..size {
                if x != gap {
                    grid.set_walkable(x, y, false);
                }
            }
        }
        grid
    }

    fn assert_walks_whole_corridor(size: usize) {
        let grid = serpentine(size);
        let search = SingleLevelSearch::new(SearchOptions {
            allow_diagonal: false,
            algorithm: SearchAlgorithm::AStar,
            ..Default::default()
        });
        let start = GridCell::new(0, 0);
        let end = GridCell::new(size - 1, size - 1);
        let path = search.find_cells(&grid, start, end).expect("corridor connects both ends");
        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&end));
        assert_valid_path(&grid, &path, false);
        let walls = (2..size).step_by(3).count();
        assert!(path.len() > walls * (size - 1), "path of {} cells skipped part of the corridor", path.len());
    }

    #[test]
    fn test_long_corridor_is_followed_to_the_end() {
        assert_walks_whole_corridor(241);
    }

    #[test]
    #[ignore] // Long running: several million expansions
    fn test_huge_corridor_runs_to_completion() {
        assert_walks_whole_corridor(2600);
    }
}

//! Coverage report model.
//!
//! A [`CoverageReport`] is a fresh per-run snapshot of which line/branch
//! regions of a module are exercised by its tests. Reports are never merged
//! across runs.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of coverage region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Line,
    Branch,
}

/// A single line or branch region of a module.
///
/// For lines, `arm` is 0. For branches, `arm` identifies the exit taken
/// from the branching line (negative arms encode exits to enclosing scope,
/// matching the coverage-JSON convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Region {
    pub kind: RegionKind,
    pub line: u32,
    pub arm: i32,
}

impl Region {
    pub fn line(line: u32) -> Self {
        Self {
            kind: RegionKind::Line,
            line,
            arm: 0,
        }
    }

    pub fn branch(line: u32, arm: i32) -> Self {
        Self {
            kind: RegionKind::Branch,
            line,
            arm,
        }
    }

    /// Render for generation-request context, e.g. `line 12` / `branch 14->0`.
    pub fn describe(&self) -> String {
        match self.kind {
            RegionKind::Line => format!("line {}", self.line),
            RegionKind::Branch => format!("branch {}->{}", self.line, self.arm),
        }
    }
}

/// Snapshot of a module's coverage.
///
/// # Invariants
///
/// `covered` and `uncovered` are disjoint; `percent()` is derived from them
/// and never stored. A `degraded` report stands for "measurement was not
/// possible" and must have an empty `covered` set (the all-uncovered
/// assumption maximizes generation effort).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub module: PathBuf,
    pub covered: BTreeSet<Region>,
    pub uncovered: BTreeSet<Region>,
    /// True when the measurement backend could not run and this report is
    /// the all-uncovered fallback.
    pub degraded: bool,
}

impl CoverageReport {
    pub fn new(
        module: impl Into<PathBuf>,
        covered: BTreeSet<Region>,
        uncovered: BTreeSet<Region>,
    ) -> Self {
        Self {
            module: module.into(),
            covered,
            uncovered,
            degraded: false,
        }
    }

    /// The all-uncovered fallback used when measurement is unavailable.
    pub fn degraded(module: impl Into<PathBuf>) -> Self {
        Self {
            module: module.into(),
            covered: BTreeSet::new(),
            uncovered: BTreeSet::new(),
            degraded: true,
        }
    }

    /// Aggregate coverage in 0.0–100.0. An empty report counts as 0%.
    pub fn percent(&self) -> f64 {
        let total = self.covered.len() + self.uncovered.len();
        if total == 0 {
            return 0.0;
        }
        self.covered.len() as f64 / total as f64 * 100.0
    }

    /// Coverage delta of `self` versus a pre-generation baseline, in
    /// percentage points. Positive means the candidate improved coverage.
    pub fn delta_from(&self, baseline: &CoverageReport) -> f64 {
        self.percent() - baseline.percent()
    }

    /// Whether generation has anything to chase.
    pub fn has_gaps(&self) -> bool {
        self.degraded || !self.uncovered.is_empty()
    }

    /// Uncovered regions rendered for the generation request.
    pub fn gap_descriptions(&self) -> Vec<String> {
        self.uncovered.iter().map(Region::describe).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(covered: &[u32], uncovered: &[u32]) -> CoverageReport {
        CoverageReport::new(
            "src/m.py",
            covered.iter().map(|l| Region::line(*l)).collect(),
            uncovered.iter().map(|l| Region::line(*l)).collect(),
        )
    }

    #[test]
    fn test_percent_derivation() {
        assert_eq!(report(&[1, 2, 3], &[4]).percent(), 75.0);
        assert_eq!(report(&[], &[]).percent(), 0.0);
        assert_eq!(report(&[1], &[]).percent(), 100.0);
    }

    #[test]
    fn test_delta_sign() {
        let baseline = report(&[1, 2], &[3, 4]);
        let improved = report(&[1, 2, 3], &[4]);
        let regressed = report(&[1], &[2, 3, 4]);

        assert!(improved.delta_from(&baseline) > 0.0);
        assert!(regressed.delta_from(&baseline) < 0.0);
        assert_eq!(baseline.delta_from(&baseline), 0.0);
    }

    #[test]
    fn test_degraded_report_has_gaps() {
        let degraded = CoverageReport::degraded("src/m.py");
        assert!(degraded.has_gaps());
        assert_eq!(degraded.percent(), 0.0);
        assert!(degraded.covered.is_empty());
    }

    #[test]
    fn test_fully_covered_has_no_gaps() {
        assert!(!report(&[1, 2], &[]).has_gaps());
        assert!(report(&[1], &[2]).has_gaps());
    }

    #[test]
    fn test_region_descriptions() {
        assert_eq!(Region::line(12).describe(), "line 12");
        assert_eq!(Region::branch(14, 0).describe(), "branch 14->0");
        assert_eq!(Region::branch(7, -1).describe(), "branch 7->-1");
    }

    #[test]
    fn test_delta_consistent_with_percent_ordering() {
        // Deterministic pseudo-random reports via simple LCG to avoid a
        // rand dep.
        let mut state: u64 = 0x5EED_CAFE;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 33) % 40) as u32
        };

        for _ in 0..200 {
            let a = report_sized(next(), next());
            let b = report_sized(next(), next());
            let delta = b.delta_from(&a);
            if b.percent() >= a.percent() {
                assert!(delta >= 0.0, "delta {delta} for {} vs {}", b.percent(), a.percent());
            } else {
                assert!(delta < 0.0);
            }
            // Antisymmetry.
            assert!((a.delta_from(&b) + delta).abs() < 1e-9);
        }
    }

    fn report_sized(covered: u32, uncovered: u32) -> CoverageReport {
        CoverageReport::new(
            "src/m.py",
            (0..covered).map(Region::line).collect(),
            (covered..covered + uncovered).map(Region::line).collect(),
        )
    }

    #[test]
    fn test_region_ordering_is_stable() {
        let mut set = BTreeSet::new();
        set.insert(Region::line(5));
        set.insert(Region::branch(3, 1));
        set.insert(Region::line(1));
        let lines: Vec<u32> = set.iter().map(|r| r.line).collect();
        // Lines sort before branches (kind first), then by line number.
        assert_eq!(lines, vec![1, 5, 3]);
    }
}

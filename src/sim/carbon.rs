//! Carbon accounting over simulator output

use super::output::TreeRecord;

/// Share of dry biomass that is carbon.
pub const CARBON_FRACTION: f64 = 0.5;

/// Carbon (kg) stored in stems, branches and roots of all trees alive in `year`.
pub fn total_carbon(rows: &[TreeRecord], year: i64) -> f64 {
    let mass: f64 = rows
        .iter()
        .filter(|r| r.year == year)
        .map(TreeRecord::sequestering_mass)
        .sum();
    mass * CARBON_FRACTION
}

/// Last simulated year present in the output.
pub fn final_year(rows: &[TreeRecord]) -> Option<i64> {
    rows.iter().map(|r| r.year).max()
}

/// Carbon at the last simulated year, `0.0` without rows.
pub fn final_carbon(rows: &[TreeRecord]) -> f64 {
    final_year(rows).map_or(0.0, |year| total_carbon(rows, year))
}

//! Reader for the simulator's SQLite output database

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

pub const TREE_TABLE: &str = "tree";

/// One simulated tree in one year, as stored in the `tree` table. Masses are in kg.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeRecord {
    pub year: i64,
    pub ru: i64,
    pub rid: i64,
    pub species: String,
    pub id: i64,
    pub x: f64,
    pub y: f64,
    pub dbh: f64,
    pub height: f64,
    pub foliage_mass: f64,
    pub stem_mass: f64,
    pub branch_mass: f64,
    pub fine_root_mass: f64,
    pub coarse_root_mass: f64,
}

impl TreeRecord {
    /// Woody plus root biomass counted towards carbon storage.
    pub fn sequestering_mass(&self) -> f64 {
        self.stem_mass + self.branch_mass + self.coarse_root_mass + self.fine_root_mass
    }
}

/// Read every row of the tree table.
///
/// `Ok(None)` means there is no growth data: the database file or the table
/// does not exist, or the table is empty. Errors are reserved for a database
/// that exists but cannot be queried.
pub fn read_tree_table(db_path: &Path) -> Result<Option<Vec<TreeRecord>>, rusqlite::Error> {
    if !db_path.is_file() {
        return Ok(None);
    }

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let tables: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [TREE_TABLE],
        |row| row.get(0),
    )?;
    if tables == 0 {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "SELECT year, ru, rid, species, id, x, y, dbh, height, \
         foliageMass, stemMass, branchMass, fineRootMass, coarseRootMass \
         FROM tree",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TreeRecord {
                year: row.get(0)?,
                ru: row.get(1)?,
                rid: row.get(2)?,
                species: row.get(3)?,
                id: row.get(4)?,
                x: row.get(5)?,
                y: row.get(6)?,
                dbh: row.get(7)?,
                height: row.get(8)?,
                foliage_mass: row.get(9)?,
                stem_mass: row.get(10)?,
                branch_mass: row.get(11)?,
                fine_root_mass: row.get(12)?,
                coarse_root_mass: row.get(13)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((!rows.is_empty()).then_some(rows))
}

/// Test support: create a database with the simulator's `tree` schema.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn write_tree_db(path: &Path, rows: &[TreeRecord]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE tree (year INTEGER, ru INTEGER, rid INTEGER, species TEXT, id INTEGER, \
             x REAL, y REAL, dbh REAL, height REAL, basalArea REAL, volume_m3 REAL, age INTEGER, \
             leafArea_m2 REAL, foliageMass REAL, stemMass REAL, branchMass REAL, \
             fineRootMass REAL, coarseRootMass REAL, lri REAL, lightResponse REAL, \
             stressIndex REAL, reserve_kg REAL, treeFlags INTEGER);
             CREATE TABLE stand (year INTEGER, ru INTEGER, rid INTEGER, species TEXT, count_ha INTEGER);",
        )
        .unwrap();
        for r in rows {
            conn.execute(
                "INSERT INTO tree (year, ru, rid, species, id, x, y, dbh, height, foliageMass, \
                 stemMass, branchMass, fineRootMass, coarseRootMass) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    r.year,
                    r.ru,
                    r.rid,
                    r.species,
                    r.id,
                    r.x,
                    r.y,
                    r.dbh,
                    r.height,
                    r.foliage_mass,
                    r.stem_mass,
                    r.branch_mass,
                    r.fine_root_mass,
                    r.coarse_root_mass
                ],
            )
            .unwrap();
        }
    }

    pub fn tree(year: i64, id: i64, masses: [f64; 4]) -> TreeRecord {
        TreeRecord {
            year,
            ru: 0,
            rid: 0,
            species: "piab".to_string(),
            id,
            x: 1.0,
            y: 1.0,
            dbh: 2.0,
            height: 1.0,
            foliage_mass: 0.3,
            stem_mass: masses[0],
            branch_mass: masses[1],
            fine_root_mass: masses[2],
            coarse_root_mass: masses[3],
        }
    }
}

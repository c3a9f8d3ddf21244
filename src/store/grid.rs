//! Grid table operations.
//!
//! A grid table is an ordered set of rows of string cells under a header
//! row at position 0. The header defines column identity; all name
//! matching is case-insensitive and whitespace-trimmed. Row positions may
//! have gaps after deletions — order is preserved, never renumbered.

use crate::error::{Error, Result};
use rusqlite::{OptionalExtension, params};
use std::collections::HashMap;

/// Normalize a column name or match value for comparison.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A parsed header row with a normalized name→index map, built once per
/// load and reused by every lookup against the same table.
#[derive(Debug, Clone)]
pub struct Header {
    cells: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    fn from_cells(cells: Vec<String>) -> Self {
        let index = cells
            .iter()
            .enumerate()
            .map(|(i, name)| (normalize(name), i))
            .collect();
        Self { cells, index }
    }

    /// Column index for a name, normalized. None if the header lacks it.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(&normalize(name)).copied()
    }

    /// Raw header cells, in column order.
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// A data row: position plus cells in column order.
#[derive(Debug, Clone)]
pub struct GridRow {
    pub pos: i64,
    pub cells: Vec<String>,
}

fn encode_cells(cells: &[String]) -> String {
    serde_json::to_string(cells).unwrap_or_else(|_| "[]".to_string())
}

fn decode_cells(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

impl super::Store {
    /// Create a grid table with the given header row, if absent.
    pub fn create_sheet(&self, sheet: &str, headers: &[String]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO grid_rows (sheet, pos, cells) VALUES (?1, 0, ?2)",
                params![sheet, encode_cells(headers)],
            )?;
            Ok(())
        })
    }

    /// Does the sheet have a header row?
    pub fn sheet_exists(&self, sheet: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let row: Option<i64> = conn
                .query_row(
                    "SELECT pos FROM grid_rows WHERE sheet = ?1 AND pos = 0",
                    params![sheet],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(row.is_some())
        })
    }

    /// Load a sheet's header. Fails if the sheet is not provisioned.
    pub fn header(&self, sheet: &str) -> Result<Header> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT cells FROM grid_rows WHERE sheet = ?1 AND pos = 0",
                    params![sheet],
                    |row| row.get(0),
                )
                .optional()?;
            let raw = raw.ok_or_else(|| Error::Config(format!("sheet not provisioned: {sheet}")))?;
            Ok(Header::from_cells(decode_cells(&raw)))
        })
    }

    /// Append rows at the tail, in input order, in one transaction.
    pub fn append_rows(&self, sheet: &str, rows: &[Vec<String>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.with_transaction(|tx| {
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(pos), 0) + 1 FROM grid_rows WHERE sheet = ?1",
                params![sheet],
                |row| row.get(0),
            )?;
            for (i, cells) in rows.iter().enumerate() {
                tx.execute(
                    "INSERT INTO grid_rows (sheet, pos, cells) VALUES (?1, ?2, ?3)",
                    params![sheet, next + i as i64, encode_cells(cells)],
                )?;
            }
            Ok(())
        })
    }

    /// All data rows (header excluded), position ascending.
    pub fn rows(&self, sheet: &str) -> Result<Vec<GridRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT pos, cells FROM grid_rows WHERE sheet = ?1 AND pos > 0 ORDER BY pos ASC",
            )?;
            let rows = stmt
                .query_map(params![sheet], |row| {
                    Ok(GridRow {
                        pos: row.get(0)?,
                        cells: decode_cells(&row.get::<_, String>(1)?),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Locate the row addressed by a match value: scan bottom-to-top and
    /// return the last (most recent) row whose match-column cell equals
    /// the value after normalization, or None.
    pub fn find_match(&self, sheet: &str, column: usize, value: &str) -> Result<Option<i64>> {
        let wanted = normalize(value);
        let rows = self.rows(sheet)?;
        for row in rows.iter().rev() {
            let cell = row.cells.get(column).map(String::as_str).unwrap_or("");
            if normalize(cell) == wanted {
                return Ok(Some(row.pos));
            }
        }
        Ok(None)
    }

    /// Overwrite individual cells of one row. Cells not named are left
    /// untouched. The row is padded if an index lies past its end.
    pub fn update_cells(&self, sheet: &str, pos: i64, updates: &[(usize, String)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.with_transaction(|tx| {
            let raw: Option<String> = tx
                .query_row(
                    "SELECT cells FROM grid_rows WHERE sheet = ?1 AND pos = ?2",
                    params![sheet, pos],
                    |row| row.get(0),
                )
                .optional()?;
            let raw = raw.ok_or_else(|| Error::NotFound(format!("{sheet} row {pos}")))?;
            let mut cells = decode_cells(&raw);
            for (col, value) in updates {
                if *col >= cells.len() {
                    cells.resize(col + 1, String::new());
                }
                cells[*col] = value.clone();
            }
            tx.execute(
                "UPDATE grid_rows SET cells = ?1 WHERE sheet = ?2 AND pos = ?3",
                params![encode_cells(&cells), sheet, pos],
            )?;
            Ok(())
        })
    }

    /// Remove one row. Removing an absent row is a no-op.
    pub fn delete_grid_row(&self, sheet: &str, pos: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM grid_rows WHERE sheet = ?1 AND pos = ?2",
                params![sheet, pos],
            )?;
            Ok(())
        })
    }

    /// All values of one column, position ascending. Rows shorter than
    /// the column yield the empty string.
    pub fn column_values(&self, sheet: &str, column: usize) -> Result<Vec<String>> {
        let rows = self.rows(sheet)?;
        Ok(rows
            .into_iter()
            .map(|row| row.cells.into_iter().nth(column).unwrap_or_default())
            .collect())
    }
}

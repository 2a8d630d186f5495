use std::io::Write;

use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::{Cell, CellValue};
use crate::dep_graph::DepGraph;
use crate::error::SheetError;
use crate::formula::eval::CellLookup;
use crate::position::{Position, Size};

/// Sparse grid of cells with dependency tracking and cached evaluation.
///
/// The sheet is the sole owner of its cells. Edges between cells are stored
/// as position sets in the dependency graph and resolved through the sheet
/// on each access, so cells never hold references to one another and
/// replacing a cell is a plain map insert.
#[derive(Debug, Default)]
pub struct Sheet {
    cells: FxHashMap<Position, Cell>,
    deps: DepGraph,
}

impl CellLookup for Sheet {
    fn value_at(&self, pos: Position) -> Option<CellValue> {
        self.cells.get(&pos).map(|cell| cell.value(self))
    }
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `text` at `pos`.
    ///
    /// Rejection is atomic: if the position is invalid, the text fails to
    /// parse, or the new formula would close a reference loop, the sheet is
    /// left exactly as it was. Writing the text a cell already shows is a
    /// no-op.
    ///
    /// On success every position the new formula references exists in the
    /// sheet afterwards, materialized as an empty cell if it was never
    /// written.
    pub fn set(&mut self, pos: Position, text: &str) -> Result<(), SheetError> {
        self.check_valid(pos)?;

        let new_cell = Cell::new(text)?;
        if let Some(existing) = self.cells.get(&pos) {
            if existing.text() == new_cell.text() {
                return Ok(());
            }
        }

        let new_refs: Vec<Position> = new_cell.referenced_cells().to_vec();
        if self.deps.would_create_cycle(pos, &new_refs) {
            debug!("rejected edit at {pos}: circular reference");
            return Err(SheetError::CircularDependency(pos));
        }

        // Stale values must be gone before the replacement becomes visible.
        self.invalidate_from(pos);

        for &referenced in &new_refs {
            if !self.cells.contains_key(&referenced) {
                trace!("materializing empty cell at {referenced}");
                self.cells.insert(referenced, Cell::empty());
            }
        }

        self.cells.insert(pos, new_cell);
        self.deps.replace_edges(pos, new_refs.into_iter().collect());
        Ok(())
    }

    /// The cell at `pos`, or `None` if nothing was ever written there.
    ///
    /// Positions materialized as referenced-but-never-written placeholders
    /// are visible here and report empty text.
    pub fn cell(&self, pos: Position) -> Result<Option<&Cell>, SheetError> {
        self.check_valid(pos)?;
        Ok(self.cells.get(&pos))
    }

    /// Remove the cell at `pos`. No-op when nothing is stored there.
    ///
    /// Dependents keep their edges and re-evaluate the position as empty.
    pub fn clear(&mut self, pos: Position) -> Result<(), SheetError> {
        self.check_valid(pos)?;
        if !self.cells.contains_key(&pos) {
            return Ok(());
        }
        self.invalidate_from(pos);
        self.deps.clear_cell(pos);
        self.cells.remove(&pos);
        Ok(())
    }

    /// Smallest rectangle covering every cell with non-empty text.
    /// Materialized placeholders do not count.
    pub fn printable_size(&self) -> Size {
        let mut size = Size::default();
        for (pos, cell) in &self.cells {
            if cell.is_empty() {
                continue;
            }
            size.rows = size.rows.max(pos.row + 1);
            size.cols = size.cols.max(pos.col + 1);
        }
        size
    }

    /// Write the printable rectangle's cell texts, columns separated by a
    /// tab, rows by a newline.
    pub fn print_texts<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.render(out, |cell| cell.text())
    }

    /// Write the printable rectangle's cell values in the same layout.
    pub fn print_values<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.render(out, |cell| cell.value(self).to_text())
    }

    fn render<W: Write>(
        &self,
        out: &mut W,
        mut format: impl FnMut(&Cell) -> String,
    ) -> std::io::Result<()> {
        let size = self.printable_size();
        for row in 0..size.rows {
            for col in 0..size.cols {
                if let Some(cell) = self.cells.get(&Position::new(row, col)) {
                    if !cell.is_empty() {
                        write!(out, "{}", format(cell))?;
                    }
                }
                if col + 1 == size.cols {
                    writeln!(out)?;
                } else {
                    write!(out, "\t")?;
                }
            }
        }
        Ok(())
    }

    /// Clear the memoized value at `pos` and at every transitive dependent.
    /// Iterative worklist; dependency chains can be deep.
    fn invalidate_from(&self, pos: Position) {
        let mut stack = vec![pos];
        let mut seen: FxHashSet<Position> = FxHashSet::default();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(cell) = self.cells.get(&current) {
                cell.invalidate_cache();
            }
            stack.extend(self.deps.dependents(current));
        }
    }

    fn check_valid(&self, pos: Position) -> Result<(), SheetError> {
        if pos.is_valid() {
            Ok(())
        } else {
            Err(SheetError::InvalidPosition(pos))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormulaError;

    fn pos(text: &str) -> Position {
        Position::from_text(text).unwrap()
    }

    fn value(sheet: &Sheet, text: &str) -> CellValue {
        sheet.cell(pos(text)).unwrap().unwrap().value(sheet)
    }

    #[test]
    fn test_set_and_read_back() {
        let mut sheet = Sheet::new();
        sheet.set(pos("A1"), "Hello").unwrap();

        let cell = sheet.cell(pos("A1")).unwrap().unwrap();
        assert_eq!(cell.text(), "Hello");
        assert_eq!(cell.value(&sheet), CellValue::Text("Hello".to_string()));
    }

    #[test]
    fn test_get_absent_cell() {
        let sheet = Sheet::new();
        assert_eq!(sheet.cell(pos("J10")).unwrap().map(|_| ()), None);
    }

    #[test]
    fn test_invalid_positions_rejected() {
        let mut sheet = Sheet::new();
        let bad = Position::new(Position::MAX_ROWS, 0);

        assert!(matches!(sheet.set(bad, "x"), Err(SheetError::InvalidPosition(_))));
        assert!(matches!(sheet.cell(bad), Err(SheetError::InvalidPosition(_))));
        assert!(matches!(sheet.clear(bad), Err(SheetError::InvalidPosition(_))));
    }

    #[test]
    fn test_formula_reads_other_cells() {
        let mut sheet = Sheet::new();
        sheet.set(pos("A1"), "1").unwrap();
        sheet.set(pos("A2"), "2").unwrap();
        sheet.set(pos("B1"), "=A1+A2").unwrap();

        assert_eq!(value(&sheet, "B1"), CellValue::Number(3.0));
    }

    #[test]
    fn test_edit_invalidates_transitive_dependents() {
        let mut sheet = Sheet::new();
        sheet.set(pos("A1"), "1").unwrap();
        sheet.set(pos("B1"), "=A1+1").unwrap();
        sheet.set(pos("C1"), "=B1*2").unwrap();

        assert_eq!(value(&sheet, "C1"), CellValue::Number(4.0));

        sheet.set(pos("A1"), "5").unwrap();
        assert_eq!(value(&sheet, "B1"), CellValue::Number(6.0));
        assert_eq!(value(&sheet, "C1"), CellValue::Number(12.0));
    }

    #[test]
    fn test_replaced_formula_still_tracked_by_dependents() {
        // D1 watches C1 while C1's formula is rewritten underneath it.
        let mut sheet = Sheet::new();
        sheet.set(pos("A1"), "1").unwrap();
        sheet.set(pos("C1"), "=A1").unwrap();
        sheet.set(pos("D1"), "=C1").unwrap();
        assert_eq!(value(&sheet, "D1"), CellValue::Number(1.0));

        sheet.set(pos("C1"), "=A1+10").unwrap();
        assert_eq!(value(&sheet, "D1"), CellValue::Number(11.0));

        sheet.set(pos("A1"), "2").unwrap();
        assert_eq!(value(&sheet, "D1"), CellValue::Number(12.0));
    }

    #[test]
    fn test_clear_turns_reference_into_zero() {
        let mut sheet = Sheet::new();
        sheet.set(pos("A1"), "41").unwrap();
        sheet.set(pos("B1"), "=A1+1").unwrap();
        assert_eq!(value(&sheet, "B1"), CellValue::Number(42.0));

        sheet.clear(pos("A1")).unwrap();
        assert_eq!(sheet.cell(pos("A1")).unwrap().map(|_| ()), None);
        assert_eq!(value(&sheet, "B1"), CellValue::Number(1.0));
    }

    #[test]
    fn test_clear_absent_is_noop() {
        let mut sheet = Sheet::new();
        sheet.clear(pos("A1")).unwrap();
        sheet.clear(pos("J10")).unwrap();
    }

    #[test]
    fn test_cycle_rejected_without_side_effects() {
        let mut sheet = Sheet::new();
        sheet.set(pos("E2"), "=E4").unwrap();
        sheet.set(pos("E4"), "=X9").unwrap();
        sheet.set(pos("X9"), "=M6").unwrap();
        sheet.set(pos("M6"), "Ready").unwrap();

        let err = sheet.set(pos("M6"), "=E2");
        assert_eq!(err, Err(SheetError::CircularDependency(pos("M6"))));
        assert_eq!(sheet.cell(pos("M6")).unwrap().unwrap().text(), "Ready");
        // The chain still evaluates
        assert_eq!(value(&sheet, "E2"), CellValue::Error(FormulaError::Value));
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut sheet = Sheet::new();
        assert!(matches!(
            sheet.set(pos("A1"), "=A1"),
            Err(SheetError::CircularDependency(_))
        ));
        assert_eq!(sheet.cell(pos("A1")).unwrap().map(|_| ()), None);
    }

    #[test]
    fn test_rejected_set_materializes_nothing() {
        let mut sheet = Sheet::new();
        sheet.set(pos("A1"), "=B1").unwrap();

        // B1 = Z99 + A1 loops through A1; Z99 was never written and must
        // not appear as a side effect of the failed edit.
        assert!(sheet.set(pos("B1"), "=Z99+A1").is_err());
        assert_eq!(sheet.cell(pos("Z99")).unwrap().map(|_| ()), None);
        assert_eq!(sheet.cell(pos("B1")).unwrap().unwrap().text(), "");
    }

    #[test]
    fn test_referenced_positions_materialize_as_empty_cells() {
        let mut sheet = Sheet::new();
        sheet.set(pos("B2"), "=B1").unwrap();

        let placeholder = sheet.cell(pos("B1")).unwrap().unwrap();
        assert!(placeholder.is_empty());
        assert_eq!(placeholder.text(), "");
        assert!(placeholder.referenced_cells().is_empty());
    }

    #[test]
    fn test_placeholders_excluded_from_printable_size() {
        let mut sheet = Sheet::new();
        sheet.set(pos("A5"), "=J9").unwrap();

        // J9 is materialized but empty; only A5 counts.
        assert!(sheet.cell(pos("J9")).unwrap().is_some());
        assert_eq!(sheet.printable_size(), Size { rows: 5, cols: 1 });
    }

    #[test]
    fn test_printable_size_empty_sheet() {
        let sheet = Sheet::new();
        assert_eq!(sheet.printable_size(), Size { rows: 0, cols: 0 });

        let mut sheet = Sheet::new();
        sheet.set(pos("C4"), "").unwrap();
        assert_eq!(sheet.printable_size(), Size { rows: 0, cols: 0 });
    }

    #[test]
    fn test_same_text_write_is_noop() {
        let mut sheet = Sheet::new();
        sheet.set(pos("A1"), "Hello").unwrap();
        sheet.set(pos("A1"), "Hello").unwrap();
        assert_eq!(sheet.cell(pos("A1")).unwrap().unwrap().text(), "Hello");

        // Canonically equal formula text is also a no-op
        sheet.set(pos("B1"), "=2+2").unwrap();
        sheet.set(pos("B1"), "= 2 + 2").unwrap();
        assert_eq!(sheet.cell(pos("B1")).unwrap().unwrap().text(), "=2+2");
    }

    #[test]
    fn test_print_layout() {
        let mut sheet = Sheet::new();
        sheet.set(pos("A2"), "meow").unwrap();
        sheet.set(pos("B2"), "=35").unwrap();

        assert_eq!(sheet.printable_size(), Size { rows: 2, cols: 2 });

        let mut texts = Vec::new();
        sheet.print_texts(&mut texts).unwrap();
        assert_eq!(String::from_utf8(texts).unwrap(), "\t\nmeow\t=35\n");

        let mut values = Vec::new();
        sheet.print_values(&mut values).unwrap();
        assert_eq!(String::from_utf8(values).unwrap(), "\t\nmeow\t35\n");
    }

    #[test]
    fn test_print_values_renders_errors() {
        let mut sheet = Sheet::new();
        sheet.set(pos("A1"), "=1/0").unwrap();

        let mut out = Vec::new();
        sheet.print_values(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "#ARITHM!\n");
    }
}

mod layout;
mod workbook;

pub use layout::{ColumnMap, ReportColumn, RowMap};
pub use workbook::{
    cell_ref, col_index_to_letter, CellEdit, CellStyle, CellValue, MergedRange, Sheet, Workbook,
};

pub mod amount;
pub mod classify;
pub mod excel_scanner;
pub mod fields;
pub mod normalize;
pub mod region;
pub mod table_total;

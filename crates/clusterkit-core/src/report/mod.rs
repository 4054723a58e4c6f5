//! Tabular output: workbooks of CSV sheets and the discovery-bundle report.

pub mod builder;
pub mod csv;
pub mod hostfacts;
pub mod workbook;

pub use builder::ReportBuilder;
pub use workbook::{Cell, Sheet, Workbook};

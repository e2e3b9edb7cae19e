pub mod cursor;

pub use cursor::ReportCursor;

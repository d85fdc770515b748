pub mod output;
pub mod table;
pub mod theme;

pub use output::{empty, error, header, info, success};
pub use table::{rows_table, stats_table};
pub use theme::{theme, Theme};

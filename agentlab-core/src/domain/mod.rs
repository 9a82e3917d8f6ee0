//! Domain types: price bars and indicator-augmented tables.

pub mod bar;
pub mod table;

pub use bar::PriceBar;
pub use table::PriceTable;

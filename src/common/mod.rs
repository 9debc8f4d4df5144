pub mod context;
pub mod interner;
pub mod macros;
pub mod options;

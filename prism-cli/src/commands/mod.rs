pub mod run;
pub mod validate;

pub use run::run_search;
pub use validate::run_validate;

//! Command handlers -- one module per subcommand

pub mod analyze;
pub mod invalidate;

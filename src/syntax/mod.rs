pub mod expr;
pub mod stmt;

pub use expr::{Expr, LiteralValue};
pub use stmt::Stmt;

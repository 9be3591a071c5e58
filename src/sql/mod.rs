//! SQL statement tree, rendering and syntax verification.
pub mod render;
pub mod types;
pub mod verify;

pub use render::{quote_ident, render, render_literal};
pub use types::*;
pub use verify::check_syntax;

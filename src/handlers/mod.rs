pub mod health;
pub mod documents;
pub mod comments;
pub mod diagnostics;

pub use health::*;
pub use documents::*;
pub use comments::*;
pub use diagnostics::*;

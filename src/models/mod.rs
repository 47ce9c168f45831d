pub mod ids;
pub mod document;
pub mod comment;
pub mod messages;
pub mod doc_api;
pub mod health;
pub mod diagnostics;
pub mod error;

pub use ids::*;
pub use document::*;
pub use comment::*;
pub use messages::*;
pub use doc_api::*;
pub use health::*;
pub use diagnostics::*;
pub use error::*;

pub mod auth_service;
pub mod comment_log;
pub mod deadline;
pub mod user_directory;
pub mod version_store;

pub use auth_service::{Authenticator, AuthError, JwtAuthenticator};
pub use comment_log::CommentLog;
pub use user_directory::{NoDirectory, StaticDirectory, UserDirectory};
pub use version_store::VersionStore;

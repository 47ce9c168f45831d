use std::collections::HashMap;

use futures_util::future::{BoxFuture, FutureExt};

use crate::models::UserId;

/// Resolves user ids to display names. Identity data lives outside this
/// service; lookups are best effort.
pub trait UserDirectory: Send + Sync {
    fn display_name<'a>(&'a self, user: &'a UserId) -> BoxFuture<'a, Result<Option<String>, String>>;
}

/// Used when no user service is configured: authors are shown by id
pub struct NoDirectory;

impl UserDirectory for NoDirectory {
    fn display_name<'a>(&'a self, _user: &'a UserId) -> BoxFuture<'a, Result<Option<String>, String>> {
        async { Ok(None) }.boxed()
    }
}

/// Fixed id → name table
#[derive(Default)]
pub struct StaticDirectory {
    names: HashMap<UserId, String>,
}

impl StaticDirectory {
    pub fn new(names: impl IntoIterator<Item = (UserId, String)>) -> Self {
        Self { names: names.into_iter().collect() }
    }
}

impl UserDirectory for StaticDirectory {
    fn display_name<'a>(&'a self, user: &'a UserId) -> BoxFuture<'a, Result<Option<String>, String>> {
        async move { Ok(self.names.get(user).cloned()) }.boxed()
    }
}

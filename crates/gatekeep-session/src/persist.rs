use std::fmt;

use gatekeep_store::StoreSnapshot;

/// How the controller writes the store after a successful challenge.
#[derive(Default)]
pub enum Persistence {
    /// Save on the calling thread before the transition returns.
    #[default]
    Inline,
    /// Hand a snapshot to a writer elsewhere. The controller never waits
    /// on the disk.
    Deferred(Box<dyn Fn(StoreSnapshot) + Send>),
}

impl Persistence {
    pub fn deferred(sink: impl Fn(StoreSnapshot) + Send + 'static) -> Self {
        Self::Deferred(Box::new(sink))
    }
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("Inline"),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

//! Parent/child links between resources.
//!
//! A derived resource may have a different value type than its parent, so
//! both directions of the link are type-erased:
//!
//! - child → parent is a strong [`Upstream`] reference, used to delegate
//!   `load`, report disposal and walk to the root when exporting.
//! - parent → child is a [`Downstream`] entry holding a weak reference to the
//!   child plus the projection to apply. Dropping every handle to a child
//!   therefore frees it even while the parent is still loading.

use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::error::{Error, FetchError};

use super::handle::{Resource, Shared};
use super::ResourceId;

/// A loaded root value ready to be placed in a server snapshot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Export {
    pub(crate) id: String,
    pub(crate) key: String,
    pub(crate) value: Value,
}

pub(crate) trait Upstream: Send + Sync {
    fn load(&self);

    /// The dependent `child` went away.
    fn release(&self, child: ResourceId);

    fn export(&self) -> Option<Result<Export, Error>>;
}

impl<T> Upstream for Resource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn load(&self) {
        Resource::load(self);
    }

    fn release(&self, child: ResourceId) {
        Resource::release(self, child);
    }

    fn export(&self) -> Option<Result<Export, Error>> {
        Resource::export(self)
    }
}

pub(crate) type Projection<T, U> = Box<dyn Fn(&T) -> Result<U, FetchError> + Send + Sync>;

pub(crate) trait Downstream<T>: Send + Sync {
    /// Id of the child this entry settles.
    fn child_id(&self) -> ResourceId;

    fn resolve(&self, value: &T);

    fn reject(&self, err: &FetchError);
}

pub(crate) struct Derived<T, U> {
    pub(crate) id: ResourceId,
    pub(crate) child: Weak<Shared<U>>,
    pub(crate) project: Projection<T, U>,
}

impl<T, U> Downstream<T> for Derived<T, U>
where
    T: Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    fn child_id(&self) -> ResourceId {
        self.id
    }

    fn resolve(&self, value: &T) {
        if let Some(shared) = self.child.upgrade() {
            Resource::from_shared(shared).settle((self.project)(value));
        }
    }

    fn reject(&self, err: &FetchError) {
        if let Some(shared) = self.child.upgrade() {
            Resource::from_shared(shared).settle(Err(err.clone()));
        }
    }
}

pub(crate) fn upstream<T>(resource: &Resource<T>) -> Arc<dyn Upstream>
where
    T: Clone + Send + Sync + 'static,
{
    Arc::new(resource.clone())
}

//! Per-call-site state for [`crate::ResourceFactory::use_resource`].
//!
//! A component that reads data through a factory keeps one [`ResourceHook`]
//! across renders. The host drives it through three phases:
//!
//! 1. render: `factory.use_resource(&mut hook, req)` returns the resource to
//!    read. The same resource comes back as long as the request (or its cache
//!    key) is unchanged.
//! 2. commit: `hook.commit()` after the render is committed. Disposes the
//!    previously committed resource if the request changed, then loads the
//!    current one.
//! 3. unmount: `hook.unmount()` disposes whatever the hook still holds.
//!
//! On the server there are no effects, so the hook is never committed and
//! holds nothing between calls.

use crate::resource::Resource;

pub struct ResourceHook<Req, T> {
    req: Option<Req>,
    key: Option<String>,
    current: Option<Resource<T>>,
    committed: Option<Resource<T>>,
}

impl<Req, T> Default for ResourceHook<Req, T> {
    fn default() -> Self {
        Self {
            req: None,
            key: None,
            current: None,
            committed: None,
        }
    }
}

impl<Req, T> ResourceHook<Req, T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource returned by the latest render.
    pub fn resource(&self) -> Option<&Resource<T>> {
        self.current.as_ref()
    }

    /// Resource loaded by the latest commit.
    pub fn committed(&self) -> Option<&Resource<T>> {
        self.committed.as_ref()
    }

    /// Mount/update effect.
    pub fn commit(&mut self) {
        let Some(current) = self.current.clone() else {
            return;
        };

        if let Some(committed) = self.committed.take() {
            if committed.ptr_eq(&current) {
                self.committed = Some(committed);
                return;
            }
            committed.dispose();
        }

        current.load();
        self.committed = Some(current);
    }

    /// Unmount cleanup.
    pub fn unmount(&mut self) {
        if let Some(committed) = self.committed.take() {
            committed.dispose();
        }
        // A render that never committed still holds a live dependent.
        if let Some(current) = self.current.take() {
            current.dispose();
        }
        self.req = None;
        self.key = None;
    }

    pub(crate) fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub(crate) fn set(&mut self, req: Req, key: Option<String>, resource: Resource<T>) {
        if let Some(replaced) = self.current.replace(resource) {
            let current = self.current.as_ref();
            let committed = self.committed.as_ref();
            let kept = current.is_some_and(|r| r.ptr_eq(&replaced))
                || committed.is_some_and(|r| r.ptr_eq(&replaced));
            if !kept {
                // Rendered but never committed.
                replaced.dispose();
            }
        }
        self.req = Some(req);
        self.key = key;
    }
}

impl<Req, T> ResourceHook<Req, T>
where
    Req: PartialEq,
    T: Clone + Send + Sync + 'static,
{
    /// The current resource, if it was rendered for an equal request.
    pub(crate) fn current_for(&self, req: &Req) -> Option<Resource<T>> {
        match (&self.req, &self.current) {
            (Some(prev), Some(current)) if prev == req => Some(current.clone()),
            _ => None,
        }
    }
}

//! Resource state and read results.

use crate::error::FetchError;

use super::Suspend;

/// Load status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Created but not started. Only root resources sit here.
    Inactive,

    /// Fetch in flight, or waiting on an ancestor.
    Loading,

    /// Value available.
    Loaded,

    /// Fetch or projection failed.
    Errored,

    /// Disposed before settling.
    Aborted,
}

impl Status {
    /// Loaded, errored and aborted resources never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Loaded | Self::Errored | Self::Aborted)
    }
}

/// Status together with the value it implies.
pub(crate) enum State<T> {
    Inactive,
    Loading,
    Loaded(T),
    Errored(FetchError),
    Aborted,
}

impl<T> State<T> {
    pub(crate) fn status(&self) -> Status {
        match self {
            Self::Inactive => Status::Inactive,
            Self::Loading => Status::Loading,
            Self::Loaded(_) => Status::Loaded,
            Self::Errored(_) => Status::Errored,
            Self::Aborted => Status::Aborted,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self, Self::Inactive | Self::Loading)
    }
}

/// Which usage pattern a resource instance has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadMode {
    None,
    Read,
    Child,
}

impl ReadMode {
    /// Record `next` as the usage pattern, or fail if a different one was
    /// already recorded.
    pub(crate) fn enter(&mut self, next: ReadMode) -> Result<(), crate::Error> {
        match *self {
            ReadMode::None => {
                *self = next;
                Ok(())
            }
            current if current == next => Ok(()),
            _ => Err(crate::Error::MixedUsage),
        }
    }
}

/// Result of reading a resource.
#[derive(Debug, Clone)]
pub enum Read<T> {
    /// The value has loaded.
    Ready(T),

    /// Not settled yet. Await the handle, then read again.
    Pending(Suspend),

    /// The fetch (or a projection above this resource) failed.
    Failed(FetchError),
}

impl<T> Read<T> {
    /// Whether the value is available.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Get the value if ready.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Convert into a `Result` so a render function can bail out with `?`
    /// and let its caller decide between waiting and showing an error.
    pub fn into_result(self) -> Result<T, Suspension> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Pending(suspend) => Err(Suspension::Pending(suspend)),
            Self::Failed(err) => Err(Suspension::Failed(err)),
        }
    }
}

/// Why a read did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Suspension {
    /// Still loading.
    #[error("resource is still loading")]
    Pending(Suspend),

    /// Loading failed.
    #[error(transparent)]
    Failed(FetchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_mode_rejects_mixing() {
        let mut mode = ReadMode::None;
        mode.enter(ReadMode::Read).unwrap();
        mode.enter(ReadMode::Read).unwrap();
        assert!(matches!(
            mode.enter(ReadMode::Child),
            Err(crate::Error::MixedUsage)
        ));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!Status::Inactive.is_terminal());
        assert!(!Status::Loading.is_terminal());
        assert!(Status::Loaded.is_terminal());
        assert!(Status::Errored.is_terminal());
        assert!(Status::Aborted.is_terminal());
    }

    #[test]
    fn into_result_maps_variants() {
        assert_eq!(Read::Ready(3).into_result().unwrap(), 3);

        let err = FetchError::msg("nope");
        match Read::<u8>::Failed(err.clone()).into_result() {
            Err(Suspension::Failed(e)) => assert!(e.ptr_eq(&err)),
            other => panic!("unexpected {:?}", other),
        }

        let suspend = Suspend::new();
        match Read::<u8>::Pending(suspend.clone()).into_result() {
            Err(Suspension::Pending(s)) => assert!(s.ptr_eq(&suspend)),
            other => panic!("unexpected {:?}", other),
        }
    }
}

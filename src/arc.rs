// SPDX-License-Identifier: BSD-3-Clause
//! Shared pointers with identity semantics

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::ptr;

use triomphe::Arc;

/// A reference-counting pointer to an interned `T`.
///
/// Values behind a `UArc` are created by an interner that hands out exactly
/// one `UArc` per distinct `T`, so [`Eq`], [`Ord`] and [`Hash`] only look at
/// the pointer. Cloning bumps a reference count and never copies `T`.
pub struct UArc<T>(Arc<T>);

fn _assert_uarc_send_sync()
where
    UArc<String>: Send + Sync,
{
}

impl<T> UArc<T> {
    pub(crate) fn new(t: T) -> Self {
        Self(Arc::new(t))
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl<T> Clone for UArc<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Hashes the pointer
impl<T> Hash for UArc<T> {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        ptr::hash(Arc::as_ptr(&self.0), state)
    }
}

/// Compares the pointers
impl<T> PartialEq for UArc<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for UArc<T> {}

/// Orders by address; stable within one run only
impl<T> PartialOrd for UArc<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for UArc<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: Debug> Debug for UArc<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Only displays the value
impl<T: Display> Display for UArc<T> {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<T> std::ops::Deref for UArc<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

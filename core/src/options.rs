//! Configuration for the VM (spec's ambient configuration surface).
//!
//! Fields are `Option`, following the engine-options pattern: `None` means
//! "not specified, use the built-in default", so a caller can override just
//! the knob it cares about and inherit sensible values for the rest.

use crate::vm::stack::DEFAULT_CAPACITY as DEFAULT_STACK_CAPACITY;

/// Default number of pre-allocated stores the pool starts with, so the
/// first few scope pushes in a program don't pay an allocation.
pub const DEFAULT_STORE_POOL_SIZE: usize = 8;

/// Configuration options for a [`crate::vm::Vm`].
///
/// # Example
///
/// ```
/// use loom_core::options::VmOptions;
///
/// let options = VmOptions {
///     stack_capacity: Some(10_000),
///     store_pool_size: None,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Ceiling on each frame's operand stack (spec §4.2).
    ///
    /// `None` means not specified; use the default (100,000).
    pub stack_capacity: Option<usize>,

    /// Number of `Store`s the pool pre-allocates before a VM starts running
    /// (spec §4.3's "store-pool pre-allocation").
    ///
    /// `None` means not specified; use the default (8).
    pub store_pool_size: Option<usize>,
}

impl VmOptions {
    /// Merge this options with another, preferring values from `other` when
    /// specified.
    pub fn merge(&self, other: &VmOptions) -> Self {
        VmOptions {
            stack_capacity: other.stack_capacity.or(self.stack_capacity),
            store_pool_size: other.store_pool_size.or(self.store_pool_size),
        }
    }

    pub(crate) fn stack_capacity_or_default(&self) -> usize {
        self.stack_capacity.unwrap_or(DEFAULT_STACK_CAPACITY)
    }

    pub(crate) fn store_pool_size_or_default(&self) -> usize {
        self.store_pool_size.unwrap_or(DEFAULT_STORE_POOL_SIZE)
    }
}

impl Default for VmOptions {
    fn default() -> Self {
        VmOptions {
            stack_capacity: None,
            store_pool_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_the_override() {
        let base = VmOptions { stack_capacity: Some(100), store_pool_size: Some(4) };
        let override_ = VmOptions { stack_capacity: Some(200), store_pool_size: None };
        let merged = base.merge(&override_);
        assert_eq!(merged.stack_capacity, Some(200));
        assert_eq!(merged.store_pool_size, Some(4));
    }

    #[test]
    fn unspecified_options_fall_back_to_defaults() {
        let options = VmOptions::default();
        assert_eq!(options.stack_capacity_or_default(), DEFAULT_STACK_CAPACITY);
        assert_eq!(options.store_pool_size_or_default(), DEFAULT_STORE_POOL_SIZE);
    }
}

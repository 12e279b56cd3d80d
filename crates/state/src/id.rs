//! Identity registry for facets, fields and providers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Opaque identity of a facet, field or provider.
///
/// Ids are issued by an [`IdRegistry`] in strictly increasing order, so
/// comparing two ids also tells which definition was created first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u32);

impl EntityId {
	/// Returns the raw numeric value.
	pub const fn as_u32(self) -> u32 {
		self.0
	}
}

impl core::fmt::Display for EntityId {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Issues [`EntityId`]s.
///
/// Cloning the registry yields another handle onto the same counter. Every
/// facet, field and provider that takes part in one [`EditorState`] must be
/// minted from the same registry, otherwise ids can collide.
///
/// [`EditorState`]: crate::EditorState
#[derive(Debug, Clone, Default)]
pub struct IdRegistry {
	next: Arc<AtomicU32>,
}

impl IdRegistry {
	/// Creates a registry whose first id is `#0`.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns a fresh id, strictly greater than every id issued before.
	pub fn next_id(&self) -> EntityId {
		EntityId(self.next.fetch_add(1, Ordering::Relaxed))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ids_strictly_increase_across_handles() {
		let ids = IdRegistry::new();
		let other = ids.clone();
		let a = ids.next_id();
		let b = other.next_id();
		let c = ids.next_id();
		assert!(a < b && b < c);
	}

	#[test]
	fn separate_registries_are_isolated() {
		let first = IdRegistry::new();
		let second = IdRegistry::new();
		assert_eq!(first.next_id(), second.next_id());
	}
}

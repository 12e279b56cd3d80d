use crate::id::EntityId;

/// Errors raised while composing extensions or building a state.
///
/// None of these are transient: the composition itself is at fault and
/// rerunning the same build fails the same way.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
	/// A computed provider was built against a static facet.
	#[error("facet {facet} is static and cannot take computed inputs")]
	ComputedStaticFacet { facet: EntityId },

	/// A slot depends, directly or transitively, on itself.
	#[error("cyclic dependency while computing dynamic slot {slot} (owner {owner})")]
	CyclicDependency { slot: usize, owner: EntityId },

	/// Two distinct definitions share one id, which happens when they were
	/// minted from different registries.
	#[error("entity {id} is defined more than once; ids must come from one registry")]
	DuplicateEntity { id: EntityId },

	/// A field was read from a state whose configuration does not contain it.
	#[error("field {field} is not present in this state")]
	FieldNotPresent { field: EntityId },

	/// A slot was read before it was computed.
	#[error("slot {slot} was read before it was computed")]
	UnresolvedSlot { slot: usize },

	/// A slot held a value of a different type than its definition declares.
	#[error("slot value for {entity} has an unexpected type")]
	ValueType { entity: EntityId },
}

use std::any::Any;
use std::sync::Arc;

use crate::error::StateError;
use crate::id::EntityId;

/// Type-erased slot content.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

/// Bound for anything stored in a slot: field values and facet outputs.
pub trait StateValue: Any + PartialEq + Send + Sync {}

impl<T: Any + PartialEq + Send + Sync> StateValue for T {}

/// Bound for facet inputs, which are cloned into the list handed to `combine`.
pub trait FacetInput: StateValue + Clone {}

impl<T: StateValue + Clone> FacetInput for T {}

pub(crate) fn downcast<T: Any + Send + Sync>(value: &Value, entity: EntityId) -> Result<Arc<T>, StateError> {
	value
		.clone()
		.downcast::<T>()
		.map_err(|_| StateError::ValueType { entity })
}

pub(crate) fn downcast_ref<T: Any>(value: &Value, entity: EntityId) -> Result<&T, StateError> {
	value
		.downcast_ref::<T>()
		.ok_or(StateError::ValueType { entity })
}

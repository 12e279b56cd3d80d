//! State fields: typed values carried from snapshot to snapshot.

use std::sync::Arc;

use smallvec::smallvec;

use crate::error::StateError;
use crate::extension::{Extension, Precedence};
use crate::facet::{Dependency, Facet, Getter, ProviderValue};
use crate::id::{EntityId, IdRegistry};
use crate::state::{EditorState, Transition};
use crate::value::{FacetInput, StateValue, Value, downcast_ref};

type CreateFn<V> = Box<dyn Fn(&EditorState) -> Result<V, StateError> + Send + Sync>;
type UpdateFn<V> = Box<dyn Fn(&V, &Transition, &EditorState) -> Result<V, StateError> + Send + Sync>;
type CompareFn<V> = Box<dyn Fn(&V, &V) -> bool + Send + Sync>;

/// Type-erased view of a field used by the resolver and the field slot.
pub(crate) trait FieldDyn: Send + Sync {
	fn id(&self) -> EntityId;

	fn create(&self, state: &EditorState) -> Result<Value, StateError>;

	fn update(&self, old: &Value, transition: &Transition, state: &EditorState) -> Result<Value, StateError>;

	fn compare(&self, a: &Value, b: &Value) -> bool;
}

struct FieldInner<V> {
	id: EntityId,
	create: CreateFn<V>,
	update: UpdateFn<V>,
	compare: CompareFn<V>,
}

impl<V: StateValue> FieldDyn for FieldInner<V> {
	fn id(&self) -> EntityId {
		self.id
	}

	fn create(&self, state: &EditorState) -> Result<Value, StateError> {
		Ok(Arc::new((self.create)(state)?))
	}

	fn update(&self, old: &Value, transition: &Transition, state: &EditorState) -> Result<Value, StateError> {
		let old = downcast_ref::<V>(old, self.id)?;
		Ok(Arc::new((self.update)(old, transition, state)?))
	}

	fn compare(&self, a: &Value, b: &Value) -> bool {
		match (a.downcast_ref::<V>(), b.downcast_ref::<V>()) {
			(Some(a), Some(b)) => (self.compare)(a, b),
			_ => false,
		}
	}
}

/// A typed value stored in every state whose configuration includes it.
///
/// The value is created when the field first appears and updated for every
/// transition afterwards. When `update` yields a value equal to the old one
/// (per the field's comparison), the old value is kept and nothing that
/// depends on the field is recomputed.
pub struct StateField<V> {
	inner: Arc<FieldInner<V>>,
	provides: Vec<Extension>,
	extension: Extension,
}

impl<V> Clone for StateField<V> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
			provides: self.provides.clone(),
			extension: self.extension.clone(),
		}
	}
}

impl<V> core::fmt::Debug for StateField<V> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("StateField")
			.field("id", &self.inner.id)
			.field("provides", &self.provides.len())
			.finish()
	}
}

impl<V> StateField<V> {
	pub fn id(&self) -> EntityId {
		self.inner.id
	}
}

impl<V: StateValue> StateField<V> {
	/// Starts a field definition.
	pub fn builder<C, U>(create: C, update: U) -> FieldBuilder<V>
	where
		C: Fn(&EditorState) -> Result<V, StateError> + Send + Sync + 'static,
		U: Fn(&V, &Transition, &EditorState) -> Result<V, StateError> + Send + Sync + 'static,
	{
		FieldBuilder {
			create: Box::new(create),
			update: Box::new(update),
			compare: None,
		}
	}

	/// Defines a field compared with [`PartialEq`].
	pub fn define<C, U>(ids: &IdRegistry, create: C, update: U) -> Self
	where
		C: Fn(&EditorState) -> Result<V, StateError> + Send + Sync + 'static,
		U: Fn(&V, &Transition, &EditorState) -> Result<V, StateError> + Send + Sync + 'static,
	{
		Self::builder(create, update).build(ids)
	}

	/// Feeds `get(value)` into `facet` whenever the field is part of a state.
	///
	/// # Errors
	///
	/// Returns [`StateError::ComputedStaticFacet`] if the facet is static.
	pub fn provide<I, O, F>(
		self,
		facet: &Facet<I, O>,
		get: F,
		precedence: impl Into<Option<Precedence>>,
	) -> Result<Self, StateError>
	where
		I: FacetInput,
		O: StateValue,
		F: Fn(&V) -> I + Send + Sync + 'static,
	{
		facet.check_dynamic()?;
		let id = self.inner.id;
		let getter: Getter = Arc::new(move |state: &EditorState| {
			let value = state.field_by_id::<V>(id)?;
			Ok(Arc::new(get(&value)) as Value)
		});
		Ok(self.attach(facet, ProviderValue::Single(getter), precedence.into()))
	}

	/// Feeds the field value itself into `facet`.
	///
	/// The facet receives the same allocation the state holds, so an
	/// unchanged field never looks like a new input.
	///
	/// # Errors
	///
	/// Returns [`StateError::ComputedStaticFacet`] if the facet is static.
	pub fn provide_value<O: StateValue>(
		self,
		facet: &Facet<V, O>,
		precedence: impl Into<Option<Precedence>>,
	) -> Result<Self, StateError>
	where
		V: FacetInput,
	{
		facet.check_dynamic()?;
		let id = self.inner.id;
		let getter: Getter = Arc::new(move |state: &EditorState| {
			Ok(state.field_by_id::<V>(id)? as Value)
		});
		Ok(self.attach(facet, ProviderValue::Single(getter), precedence.into()))
	}

	/// Feeds every element of `get(value)` into `facet`.
	///
	/// # Errors
	///
	/// Returns [`StateError::ComputedStaticFacet`] if the facet is static.
	pub fn provide_n<I, O, F>(
		self,
		facet: &Facet<I, O>,
		get: F,
		precedence: impl Into<Option<Precedence>>,
	) -> Result<Self, StateError>
	where
		I: FacetInput,
		O: StateValue,
		F: Fn(&V) -> Vec<I> + Send + Sync + 'static,
	{
		facet.check_dynamic()?;
		let id = self.inner.id;
		let getter: Getter = Arc::new(move |state: &EditorState| {
			let value = state.field_by_id::<V>(id)?;
			Ok(Arc::new(get(&value)) as Value)
		});
		Ok(self.attach(facet, ProviderValue::Multi(getter), precedence.into()))
	}

	fn attach<I: FacetInput, O: StateValue>(
		mut self,
		facet: &Facet<I, O>,
		value: ProviderValue,
		precedence: Option<Precedence>,
	) -> Self {
		let provider = facet.provider(smallvec![Dependency::Field(self.inner.id)], value);
		self.provides.push(match precedence {
			Some(prec) => prec.wrap(provider),
			None => provider,
		});
		self.extension = Extension::field(self.inner.clone(), self.provides.clone());
		self
	}

	/// The extension installing this field and its attached contributions.
	pub fn extension(&self) -> Extension {
		self.extension.clone()
	}
}

impl<V> From<&StateField<V>> for Extension {
	fn from(field: &StateField<V>) -> Self {
		field.extension.clone()
	}
}

impl<V> From<StateField<V>> for Extension {
	fn from(field: StateField<V>) -> Self {
		field.extension
	}
}

/// Builder for [`StateField`] definitions.
pub struct FieldBuilder<V> {
	create: CreateFn<V>,
	update: UpdateFn<V>,
	compare: Option<CompareFn<V>>,
}

impl<V: StateValue> FieldBuilder<V> {
	/// Sets the equality deciding whether an update changed the field.
	pub fn compare(mut self, compare: impl Fn(&V, &V) -> bool + Send + Sync + 'static) -> Self {
		self.compare = Some(Box::new(compare));
		self
	}

	pub fn build(self, ids: &IdRegistry) -> StateField<V> {
		let inner = Arc::new(FieldInner {
			id: ids.next_id(),
			create: self.create,
			update: self.update,
			compare: self.compare.unwrap_or_else(|| Box::new(|a: &V, b: &V| a == b)),
		});
		StateField {
			extension: Extension::field(inner.clone(), Vec::new()),
			inner,
			provides: Vec::new(),
		}
	}
}

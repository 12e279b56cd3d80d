//! Facets: aggregation points that merge provider inputs into one output.
//!
//! A [`Facet`] is defined once and then used as a key. Extensions contribute
//! inputs to it through providers, either fixed values ([`Facet::of`]) or
//! values computed from the state ([`Facet::compute`], [`Facet::compute_n`]).
//! The resolved configuration orders the inputs by precedence and hands them
//! to the facet's `combine` function.

use std::marker::PhantomData;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::StateError;
use crate::extension::Extension;
use crate::field::StateField;
use crate::id::{EntityId, IdRegistry};
use crate::state::EditorState;
use crate::value::{FacetInput, StateValue, Value, downcast_ref};

/// Computes a provider's value from the state under construction.
pub(crate) type Getter = Arc<dyn Fn(&EditorState) -> Result<Value, StateError> + Send + Sync>;

type CombineFn<I, O> = Box<dyn Fn(&[I]) -> O + Send + Sync>;
type CompareFn<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Something a computed provider reads.
///
/// A provider is only recomputed for a transition when one of its
/// dependencies changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
	/// Fires when the transition changed the document.
	DocChanged,
	/// Fires when the transition changed the selection. Document changes
	/// count as selection changes too.
	SelectionChanged,
	/// The combined output of a facet.
	Facet(EntityId),
	/// The value of a field.
	Field(EntityId),
}

impl<I, O> From<&Facet<I, O>> for Dependency {
	fn from(facet: &Facet<I, O>) -> Self {
		Dependency::Facet(facet.inner.id)
	}
}

impl<V> From<&StateField<V>> for Dependency {
	fn from(field: &StateField<V>) -> Self {
		Dependency::Field(field.id())
	}
}

/// How a provider produces its contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
	/// A fixed value known at configuration time.
	Static,
	/// One value computed from the state.
	Single,
	/// A list of values computed from the state, spliced into the input list.
	Multi,
}

pub(crate) enum ProviderValue {
	Static(Value),
	Single(Getter),
	Multi(Getter),
}

/// One contribution to a facet.
pub(crate) struct Provider {
	pub(crate) id: EntityId,
	pub(crate) facet: Arc<dyn FacetDyn>,
	pub(crate) dependencies: SmallVec<[Dependency; 2]>,
	pub(crate) value: ProviderValue,
}

impl Provider {
	pub(crate) fn kind(&self) -> ProviderKind {
		match self.value {
			ProviderValue::Static(_) => ProviderKind::Static,
			ProviderValue::Single(_) => ProviderKind::Single,
			ProviderValue::Multi(_) => ProviderKind::Multi,
		}
	}
}

impl core::fmt::Debug for Provider {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Provider")
			.field("id", &self.id)
			.field("facet", &self.facet.id())
			.field("kind", &self.kind())
			.field("dependencies", &self.dependencies)
			.finish()
	}
}

/// Type-erased view of a facet used by the resolver and the slot functions.
pub(crate) trait FacetDyn: Send + Sync {
	fn id(&self) -> EntityId;

	/// Gathers the inputs in order, splicing multi-provider lists, and combines them.
	fn combine(&self, inputs: &[(ProviderKind, &Value)]) -> Result<Value, StateError>;

	fn compare(&self, a: &Value, b: &Value) -> bool;

	/// Compares two values produced by a provider of the given kind.
	fn compare_input(&self, kind: ProviderKind, a: &Value, b: &Value) -> bool;
}

struct FacetInner<I, O> {
	id: EntityId,
	combine: CombineFn<I, O>,
	compare: CompareFn<O>,
	compare_input: CompareFn<I>,
	is_static: bool,
	default: Value,
	ids: IdRegistry,
}

impl<I: FacetInput, O: StateValue> FacetDyn for FacetInner<I, O> {
	fn id(&self) -> EntityId {
		self.id
	}

	fn combine(&self, inputs: &[(ProviderKind, &Value)]) -> Result<Value, StateError> {
		let mut values = Vec::with_capacity(inputs.len());
		for &(kind, value) in inputs {
			match kind {
				ProviderKind::Static | ProviderKind::Single => {
					values.push(downcast_ref::<I>(value, self.id)?.clone());
				}
				ProviderKind::Multi => {
					values.extend(downcast_ref::<Vec<I>>(value, self.id)?.iter().cloned());
				}
			}
		}
		Ok(Arc::new((self.combine)(&values)))
	}

	fn compare(&self, a: &Value, b: &Value) -> bool {
		match (a.downcast_ref::<O>(), b.downcast_ref::<O>()) {
			(Some(a), Some(b)) => (self.compare)(a, b),
			_ => false,
		}
	}

	fn compare_input(&self, kind: ProviderKind, a: &Value, b: &Value) -> bool {
		match kind {
			ProviderKind::Static | ProviderKind::Single => {
				match (a.downcast_ref::<I>(), b.downcast_ref::<I>()) {
					(Some(a), Some(b)) => (self.compare_input)(a, b),
					_ => false,
				}
			}
			ProviderKind::Multi => match (a.downcast_ref::<Vec<I>>(), b.downcast_ref::<Vec<I>>()) {
				(Some(a), Some(b)) => {
					a.len() == b.len()
						&& a.iter().zip(b).all(|(a, b)| (self.compare_input)(a, b))
				}
				_ => false,
			},
		}
	}
}

/// A typed aggregation point with inputs `I` and combined output `O`.
///
/// Cloning a facet is cheap and yields a handle to the same definition.
pub struct Facet<I, O = Vec<I>> {
	inner: Arc<FacetInner<I, O>>,
}

impl<I, O> Clone for Facet<I, O> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<I, O> core::fmt::Debug for Facet<I, O> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Facet")
			.field("id", &self.inner.id)
			.field("static", &self.inner.is_static)
			.finish()
	}
}

impl<I: FacetInput> Facet<I, Vec<I>> {
	/// Starts a facet definition whose output is the list of its inputs.
	pub fn builder() -> FacetBuilder<I, Vec<I>> {
		FacetBuilder {
			combine: Box::new(|values: &[I]| values.to_vec()),
			compare: None,
			compare_input: None,
			is_static: false,
			_marker: PhantomData,
		}
	}

	/// Defines a facet with the default configuration.
	pub fn define(ids: &IdRegistry) -> Self {
		Self::builder().build(ids)
	}
}

impl<I: FacetInput, O: StateValue> Facet<I, O> {
	pub fn id(&self) -> EntityId {
		self.inner.id
	}

	/// Whether this facet only accepts fixed inputs.
	pub fn is_static(&self) -> bool {
		self.inner.is_static
	}

	/// The output when no provider contributes: `combine(&[])`.
	pub fn default_value(&self) -> Result<Arc<O>, StateError> {
		crate::value::downcast(&self.inner.default, self.inner.id)
	}

	/// Builds an extension contributing a fixed `value`.
	pub fn of(&self, value: I) -> Extension {
		self.provider(SmallVec::new(), ProviderValue::Static(Arc::new(value)))
	}

	/// Builds an extension contributing one value computed by `get`.
	///
	/// `get` reruns only when one of `dependencies` changed.
	///
	/// # Errors
	///
	/// Returns [`StateError::ComputedStaticFacet`] if the facet is static.
	pub fn compute<D, F>(&self, dependencies: D, get: F) -> Result<Extension, StateError>
	where
		D: IntoIterator<Item = Dependency>,
		F: Fn(&EditorState) -> Result<I, StateError> + Send + Sync + 'static,
	{
		self.check_dynamic()?;
		let getter: Getter = Arc::new(move |state: &EditorState| get(state).map(|v| Arc::new(v) as Value));
		Ok(self.provider(dependencies.into_iter().collect(), ProviderValue::Single(getter)))
	}

	/// Builds an extension contributing a computed list of values.
	///
	/// # Errors
	///
	/// Returns [`StateError::ComputedStaticFacet`] if the facet is static.
	pub fn compute_n<D, F>(&self, dependencies: D, get: F) -> Result<Extension, StateError>
	where
		D: IntoIterator<Item = Dependency>,
		F: Fn(&EditorState) -> Result<Vec<I>, StateError> + Send + Sync + 'static,
	{
		self.check_dynamic()?;
		let getter: Getter = Arc::new(move |state: &EditorState| get(state).map(|v| Arc::new(v) as Value));
		Ok(self.provider(dependencies.into_iter().collect(), ProviderValue::Multi(getter)))
	}

	pub(crate) fn dyn_facet(&self) -> Arc<dyn FacetDyn> {
		self.inner.clone()
	}

	pub(crate) fn check_dynamic(&self) -> Result<(), StateError> {
		if self.inner.is_static {
			return Err(StateError::ComputedStaticFacet {
				facet: self.inner.id,
			});
		}
		Ok(())
	}

	pub(crate) fn provider(
		&self,
		dependencies: SmallVec<[Dependency; 2]>,
		value: ProviderValue,
	) -> Extension {
		Extension::provider(Provider {
			id: self.inner.ids.next_id(),
			facet: self.dyn_facet(),
			dependencies,
			value,
		})
	}
}

/// Builder for [`Facet`] definitions.
///
/// Unset comparisons default to [`PartialEq`].
pub struct FacetBuilder<I, O> {
	combine: CombineFn<I, O>,
	compare: Option<CompareFn<O>>,
	compare_input: Option<CompareFn<I>>,
	is_static: bool,
	_marker: PhantomData<fn(&[I]) -> O>,
}

impl<I: FacetInput, O: StateValue> FacetBuilder<I, O> {
	/// Sets how the ordered inputs are merged into the output.
	///
	/// The output type changes with the combine function, so set the output
	/// comparison afterwards.
	pub fn combine<P, F>(self, combine: F) -> FacetBuilder<I, P>
	where
		P: StateValue,
		F: Fn(&[I]) -> P + Send + Sync + 'static,
	{
		debug_assert!(
			self.compare.is_none(),
			"output comparison set before combine would be discarded"
		);
		FacetBuilder {
			combine: Box::new(combine),
			compare: None,
			compare_input: self.compare_input,
			is_static: self.is_static,
			_marker: PhantomData,
		}
	}

	/// Sets the output equality used to suppress change propagation.
	pub fn compare(mut self, compare: impl Fn(&O, &O) -> bool + Send + Sync + 'static) -> Self {
		self.compare = Some(Box::new(compare));
		self
	}

	/// Sets the input equality used to skip unchanged computed inputs.
	pub fn compare_input(mut self, compare: impl Fn(&I, &I) -> bool + Send + Sync + 'static) -> Self {
		self.compare_input = Some(Box::new(compare));
		self
	}

	/// Restricts the facet to fixed inputs, so its output is computed once
	/// per configuration.
	pub fn static_only(mut self) -> Self {
		self.is_static = true;
		self
	}

	pub fn build(self, ids: &IdRegistry) -> Facet<I, O> {
		let default: Value = Arc::new((self.combine)(&[]));
		Facet {
			inner: Arc::new(FacetInner {
				id: ids.next_id(),
				combine: self.combine,
				compare: self.compare.unwrap_or_else(|| Box::new(|a: &O, b: &O| a == b)),
				compare_input: self
					.compare_input
					.unwrap_or_else(|| Box::new(|a: &I, b: &I| a == b)),
				is_static: self.is_static,
				default,
				ids: ids.clone(),
			}),
		}
	}
}

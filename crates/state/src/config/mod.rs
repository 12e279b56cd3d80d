//! Resolution of an extension tree into an addressed slot layout.
//!
//! A [`Configuration`] is built once per distinct extension set and shared
//! by every state created from it. Facets whose inputs are all fixed are
//! combined here, once; everything else becomes a dynamic slot evaluated
//! per state.
//!
//! # Slot order
//!
//! Field slots come first, in flattened order. Facets follow in ascending id
//! order (definition order), each contributing its computed provider slots
//! and then its combine slot.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::StateError;
use crate::extension::{Extension, Leaf, flatten};
use crate::facet::{Facet, FacetDyn, Provider, ProviderKind, ProviderValue};
use crate::field::FieldDyn;
use crate::id::EntityId;
use crate::slot::{CombineSlot, DynamicSlot, FieldSlot, ProviderSlot, SlotStatus};
use crate::state::EditorState;
use crate::value::{FacetInput, StateValue, Value, downcast};


/// Location of a slot: `(index << 1) | static_bit`.
///
/// Static addresses index the configuration's fixed values, dynamic ones
/// index a state's per-snapshot values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Address(usize);

impl Address {
	pub(crate) const fn fixed(index: usize) -> Self {
		Self((index << 1) | 1)
	}

	pub(crate) const fn dynamic(index: usize) -> Self {
		Self(index << 1)
	}

	pub(crate) const fn is_static(self) -> bool {
		self.0 & 1 == 1
	}

	pub(crate) const fn index(self) -> usize {
		self.0 >> 1
	}
}

enum PendingSlot {
	Field(Arc<dyn FieldDyn>),
	Provider(Arc<Provider>),
	Combine(Arc<dyn FacetDyn>, Vec<Arc<Provider>>),
}

/// Resolved slot layout for one extension set.
pub struct Configuration {
	source: Extension,
	address: FxHashMap<EntityId, Address>,
	pub(crate) static_values: Box<[Value]>,
	pub(crate) dynamic_slots: Box<[DynamicSlot]>,
	pub(crate) status_template: Box<[SlotStatus]>,
}

impl Configuration {
	/// Resolves `extension` into a configuration.
	///
	/// When `previous` is given, facets that stay fully static and combine to
	/// a value equal to their old one keep the old value allocation.
	pub fn resolve(extension: &Extension, previous: Option<&EditorState>) -> Result<Self, StateError> {
		let mut fields: Vec<Arc<dyn FieldDyn>> = Vec::new();
		let mut field_defs: FxHashMap<EntityId, *const ()> = FxHashMap::default();
		let mut facets: BTreeMap<EntityId, (Arc<dyn FacetDyn>, Vec<Arc<Provider>>)> = BTreeMap::new();

		for leaf in flatten(extension) {
			match leaf {
				Leaf::Field(field) => {
					let def = Arc::as_ptr(&field) as *const ();
					match field_defs.insert(field.id(), def) {
						None => fields.push(field),
						Some(prev) if prev == def => {
							tracing::trace!(field = %field.id(), "skipping duplicate field definition");
						}
						Some(_) => return Err(StateError::DuplicateEntity { id: field.id() }),
					}
				}
				Leaf::Provider(provider) => {
					let (facet, providers) = facets
						.entry(provider.facet.id())
						.or_insert_with(|| (provider.facet.clone(), Vec::new()));
					if !same_definition(facet, &provider.facet) {
						return Err(StateError::DuplicateEntity { id: facet.id() });
					}
					providers.push(provider);
				}
			}
		}

		let field_count = fields.len();
		let mut address = FxHashMap::default();
		let mut static_values: Vec<Value> = Vec::new();
		let mut pending: Vec<PendingSlot> = Vec::new();

		for field in fields {
			claim(&mut address, field.id(), Address::dynamic(pending.len()))?;
			pending.push(PendingSlot::Field(field));
		}

		let facet_count = facets.len();
		for (facet_id, (facet, providers)) in facets {
			let fixed: Option<Vec<(ProviderKind, &Value)>> = providers
				.iter()
				.map(|p| match &p.value {
					ProviderValue::Static(value) => Some((ProviderKind::Static, value)),
					ProviderValue::Single(_) | ProviderValue::Multi(_) => None,
				})
				.collect();

			if let Some(inputs) = fixed {
				let mut value = facet.combine(&inputs)?;
				if let Some(prev) = previous
					&& let Some(old_addr) = prev.configuration().address_of(facet_id)
				{
					let old = prev.get_addr(old_addr)?;
					if facet.compare(&value, old) {
						tracing::debug!(facet = %facet_id, "static facet unchanged across reconfiguration");
						value = old.clone();
					}
				}
				claim(&mut address, facet_id, Address::fixed(static_values.len()))?;
				static_values.push(value);
				continue;
			}

			for provider in &providers {
				match &provider.value {
					ProviderValue::Static(value) => {
						claim(&mut address, provider.id, Address::fixed(static_values.len()))?;
						static_values.push(value.clone());
					}
					ProviderValue::Single(_) | ProviderValue::Multi(_) => {
						claim(&mut address, provider.id, Address::dynamic(pending.len()))?;
						pending.push(PendingSlot::Provider(provider.clone()));
					}
				}
			}
			claim(&mut address, facet_id, Address::dynamic(pending.len()))?;
			pending.push(PendingSlot::Combine(facet, providers));
		}

		let dynamic_slots: Box<[DynamicSlot]> = pending
			.into_iter()
			.filter_map(|slot| match slot {
				PendingSlot::Field(field) => Some(DynamicSlot::Field(FieldSlot::new(field))),
				PendingSlot::Provider(provider) => {
					let (getter, kind) = match &provider.value {
						ProviderValue::Single(getter) => (getter.clone(), ProviderKind::Single),
						ProviderValue::Multi(getter) => (getter.clone(), ProviderKind::Multi),
						ProviderValue::Static(_) => return None,
					};
					Some(DynamicSlot::Provider(ProviderSlot::new(provider, getter, kind, &address)))
				}
				PendingSlot::Combine(facet, providers) => {
					Some(DynamicSlot::Combine(CombineSlot::new(facet, &providers, &address)))
				}
			})
			.collect();

		tracing::debug!(
			fields = field_count,
			facets = facet_count,
			static_slots = static_values.len(),
			dynamic_slots = dynamic_slots.len(),
			"resolved state configuration"
		);

		Ok(Self {
			source: extension.clone(),
			address,
			static_values: static_values.into_boxed_slice(),
			status_template: vec![SlotStatus::empty(); dynamic_slots.len()].into_boxed_slice(),
			dynamic_slots,
		})
	}

	/// The extension this configuration was resolved from.
	pub fn source(&self) -> &Extension {
		&self.source
	}

	/// Whether the facet, field or provider with `id` has a slot here.
	pub fn has_entity(&self, id: EntityId) -> bool {
		self.address.contains_key(&id)
	}

	/// Number of per-state slots.
	pub fn dynamic_slot_count(&self) -> usize {
		self.dynamic_slots.len()
	}

	/// Number of fixed values computed at resolve time.
	pub fn static_slot_count(&self) -> usize {
		self.static_values.len()
	}

	/// Returns the output of `facet` if it is fixed in this configuration.
	///
	/// A facet without providers yields its default. Returns `Ok(None)` when
	/// the facet has computed inputs and therefore lives in each state.
	pub fn static_facet<I: FacetInput, O: StateValue>(&self, facet: &Facet<I, O>) -> Result<Option<Arc<O>>, StateError> {
		match self.address_of(facet.id()) {
			None => facet.default_value().map(Some),
			Some(addr) if addr.is_static() => match self.static_values.get(addr.index()) {
				Some(value) => downcast(value, facet.id()).map(Some),
				None => Err(StateError::UnresolvedSlot { slot: addr.index() }),
			},
			Some(_) => Ok(None),
		}
	}

	pub(crate) fn address_of(&self, id: EntityId) -> Option<Address> {
		self.address.get(&id).copied()
	}
}

/// Records `addr` for `id`, failing if another entity already holds the id.
///
/// Every entity reaches this once per resolution, so an occupied id means
/// two definitions were minted from different registries.
fn claim(address: &mut FxHashMap<EntityId, Address>, id: EntityId, addr: Address) -> Result<(), StateError> {
	if address.insert(id, addr).is_some() {
		return Err(StateError::DuplicateEntity { id });
	}
	Ok(())
}

fn same_definition(a: &Arc<dyn FacetDyn>, b: &Arc<dyn FacetDyn>) -> bool {
	core::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl core::fmt::Debug for Configuration {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Configuration")
			.field("entities", &self.address.len())
			.field("static_slots", &self.static_values.len())
			.field("dynamic_slots", &self.dynamic_slots.len())
			.finish()
	}
}

//! Dynamic slot update rules.
//!
//! Every dynamic slot is recomputed at most once per state. An update
//! reports whether the slot changed relative to the start state of the
//! transition; when it did not, the start state's value is carried forward
//! so reads always see a value equal to the old one.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::config::Address;
use crate::error::StateError;
use crate::facet::{Dependency, FacetDyn, Getter, Provider, ProviderKind};
use crate::field::FieldDyn;
use crate::id::EntityId;
use crate::state::{EditorState, Transition};
use crate::value::Value;

bitflags::bitflags! {
	/// Evaluation status of a dynamic slot. The empty set means uninitialized.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
	pub(crate) struct SlotStatus: u8 {
		/// The slot differs from the start state.
		const CHANGED = 1 << 0;
		/// The slot holds its final value.
		const COMPUTED = 1 << 1;
		/// The slot's update is running.
		const COMPUTING = 1 << 2;
	}
}

pub(crate) enum DynamicSlot {
	Field(FieldSlot),
	Provider(ProviderSlot),
	Combine(CombineSlot),
}

impl DynamicSlot {
	/// The facet, field or provider this slot belongs to.
	pub(crate) fn owner(&self) -> EntityId {
		match self {
			Self::Field(slot) => slot.field.id(),
			Self::Provider(slot) => slot.provider.id,
			Self::Combine(slot) => slot.facet.id(),
		}
	}

	/// Computes the slot at `index` into `state`, returning whether it changed.
	pub(crate) fn update(
		&self,
		state: &EditorState,
		index: usize,
		transition: Option<&Transition>,
	) -> Result<bool, StateError> {
		match self {
			Self::Field(slot) => slot.update(state, index, transition),
			Self::Provider(slot) => slot.update(state, index, transition),
			Self::Combine(slot) => slot.update(state, index, transition),
		}
	}
}

pub(crate) struct FieldSlot {
	field: Arc<dyn FieldDyn>,
}

impl FieldSlot {
	pub(crate) fn new(field: Arc<dyn FieldDyn>) -> Self {
		Self { field }
	}

	fn update(&self, state: &EditorState, index: usize, transition: Option<&Transition>) -> Result<bool, StateError> {
		let prior = transition.and_then(|tr| {
			let addr = if tr.reconfigured() {
				tr.start().configuration().address_of(self.field.id())?
			} else {
				Address::dynamic(index)
			};
			Some((tr, addr))
		});
		let Some((tr, old_addr)) = prior else {
			state.store(index, self.field.create(state)?);
			return Ok(true);
		};

		let old = tr.start().get_addr(old_addr)?.clone();
		let value = self.field.update(&old, tr, state)?;
		if self.field.compare(&old, &value) {
			state.store(index, old);
			Ok(false)
		} else {
			state.store(index, value);
			Ok(true)
		}
	}
}

/// Slot of a computed (single or multi) facet provider.
pub(crate) struct ProviderSlot {
	provider: Arc<Provider>,
	getter: Getter,
	kind: ProviderKind,
	doc: bool,
	selection: bool,
	dependencies: SmallVec<[Address; 2]>,
}

impl ProviderSlot {
	/// Resolves the provider's dependency list against `address`.
	///
	/// Static addresses and entities missing from the configuration are
	/// dropped, since they never change.
	pub(crate) fn new(
		provider: Arc<Provider>,
		getter: Getter,
		kind: ProviderKind,
		address: &FxHashMap<EntityId, Address>,
	) -> Self {
		let mut doc = false;
		let mut selection = false;
		let mut dependencies = SmallVec::new();
		for dep in &provider.dependencies {
			match dep {
				Dependency::DocChanged => doc = true,
				Dependency::SelectionChanged => selection = true,
				Dependency::Facet(id) | Dependency::Field(id) => {
					if let Some(&addr) = address.get(id)
						&& !addr.is_static()
					{
						dependencies.push(addr);
					}
				}
			}
		}
		Self {
			provider,
			getter,
			kind,
			doc,
			selection,
			dependencies,
		}
	}

	fn update(&self, state: &EditorState, index: usize, transition: Option<&Transition>) -> Result<bool, StateError> {
		let tr = match transition {
			Some(tr) if !tr.reconfigured() => tr,
			_ => {
				state.store(index, (self.getter)(state)?);
				return Ok(true);
			}
		};

		let old = tr.start().get_addr(Address::dynamic(index))?.clone();
		if !self.dependency_changed(state, tr)? {
			state.store(index, old);
			return Ok(false);
		}

		let value = (self.getter)(state)?;
		if self.provider.facet.compare_input(self.kind, &value, &old) {
			state.store(index, old);
			Ok(false)
		} else {
			state.store(index, value);
			Ok(true)
		}
	}

	fn dependency_changed(&self, state: &EditorState, tr: &Transition) -> Result<bool, StateError> {
		if (self.doc && tr.doc_changed())
			|| (self.selection && (tr.doc_changed() || tr.selection_changed()))
		{
			return Ok(true);
		}
		for &addr in &self.dependencies {
			if state.ensure_addr(addr)?.contains(SlotStatus::CHANGED) {
				return Ok(true);
			}
		}
		Ok(false)
	}
}

/// Slot holding the combined output of a facet with computed inputs.
pub(crate) struct CombineSlot {
	facet: Arc<dyn FacetDyn>,
	members: SmallVec<[(Address, ProviderKind); 4]>,
}

impl CombineSlot {
	pub(crate) fn new(
		facet: Arc<dyn FacetDyn>,
		providers: &[Arc<Provider>],
		address: &FxHashMap<EntityId, Address>,
	) -> Self {
		let members = providers
			.iter()
			.filter_map(|p| address.get(&p.id).map(|&addr| (addr, p.kind())))
			.collect();
		Self { facet, members }
	}

	fn update(&self, state: &EditorState, index: usize, transition: Option<&Transition>) -> Result<bool, StateError> {
		let old_addr = transition.and_then(|tr| {
			let addr = if tr.reconfigured() {
				tr.start().configuration().address_of(self.facet.id())?
			} else {
				Address::dynamic(index)
			};
			Some((tr, addr))
		});

		let mut changed = old_addr.is_none();
		for &(addr, _) in &self.members {
			if !addr.is_static() && state.ensure_addr(addr)?.contains(SlotStatus::CHANGED) {
				changed = true;
			}
		}

		let old = match old_addr {
			Some((tr, addr)) => Some(tr.start().get_addr(addr)?.clone()),
			None => None,
		};
		if let Some(old) = &old
			&& !changed
		{
			state.store(index, old.clone());
			return Ok(false);
		}

		let mut inputs: SmallVec<[(ProviderKind, &Value); 4]> = SmallVec::with_capacity(self.members.len());
		for &(addr, kind) in &self.members {
			inputs.push((kind, state.get_addr(addr)?));
		}
		let value = self.facet.combine(&inputs)?;

		if let Some(old) = old
			&& self.facet.compare(&value, &old)
		{
			state.store(index, old);
			return Ok(false);
		}
		state.store(index, value);
		Ok(true)
	}
}

//! State snapshots and transitions between them.
//!
//! # Evaluation
//!
//! A new state starts with every dynamic slot uninitialized. Construction
//! forces each slot in index order through [`EditorState::ensure_addr`],
//! which runs the slot's update and recursively forces whatever the update
//! reads. The recursion itself establishes dependency order; no separate
//! topological sort exists.
//!
//! # Invariants
//!
//! - A slot's update never observes its own slot while it is computing.
//!   Doing so is a cyclic dependency and fails the whole build.
//! - A failed update leaves its slot uninitialized and fails the whole
//!   build with the first error raised.
//! - Each dynamic value cell is written exactly once.
//! - A state that failed to build is never returned.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use crate::config::{Address, Configuration};
use crate::error::StateError;
use crate::extension::Extension;
use crate::facet::Facet;
use crate::field::StateField;
use crate::slot::SlotStatus;
use crate::value::{FacetInput, StateValue, Value, downcast};

#[cfg(test)]
mod tests;

/// Settings for the first state of an editor.
#[derive(Debug, Clone, Default)]
pub struct EditorStateConfig {
	extensions: Vec<Extension>,
}

impl EditorStateConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends an extension. Later extensions come later within their
	/// precedence tier.
	pub fn extension(mut self, extension: impl Into<Extension>) -> Self {
		self.extensions.push(extension.into());
		self
	}
}

/// Describes the move from a start state to the next one.
///
/// The flags are decided by whoever dispatches the change; this crate only
/// reacts to them.
pub struct Transition {
	start: Arc<EditorState>,
	doc_changed: bool,
	selection_changed: bool,
	reconfigure: Option<Extension>,
}

impl Transition {
	pub fn new(start: &Arc<EditorState>) -> Self {
		Self {
			start: start.clone(),
			doc_changed: false,
			selection_changed: false,
			reconfigure: None,
		}
	}

	/// Marks the document as changed.
	pub fn changes_doc(mut self) -> Self {
		self.doc_changed = true;
		self
	}

	/// Marks the selection as changed.
	pub fn changes_selection(mut self) -> Self {
		self.selection_changed = true;
		self
	}

	/// Replaces the active extension set.
	pub fn reconfigure(mut self, extension: impl Into<Extension>) -> Self {
		self.reconfigure = Some(extension.into());
		self
	}

	pub fn start(&self) -> &EditorState {
		&self.start
	}

	pub fn doc_changed(&self) -> bool {
		self.doc_changed
	}

	pub fn selection_changed(&self) -> bool {
		self.selection_changed
	}

	pub fn reconfigured(&self) -> bool {
		self.reconfigure.is_some()
	}

	/// Builds the state this transition leads to.
	///
	/// Without reconfiguration the start state's configuration is reused.
	///
	/// # Errors
	///
	/// Returns [`StateError::CyclicDependency`] if a slot depends on itself.
	pub fn apply(self) -> Result<Arc<EditorState>, StateError> {
		let config = match &self.reconfigure {
			Some(extension) => Arc::new(Configuration::resolve(extension, Some(&self.start))?),
			None => self.start.config.clone(),
		};
		EditorState::build(config, Some(self))
	}
}

impl core::fmt::Debug for Transition {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Transition")
			.field("doc_changed", &self.doc_changed)
			.field("selection_changed", &self.selection_changed)
			.field("reconfigured", &self.reconfigured())
			.finish_non_exhaustive()
	}
}

/// One immutable snapshot of editor state.
pub struct EditorState {
	config: Arc<Configuration>,
	values: Box<[OnceLock<Value>]>,
	status: Box<[AtomicU8]>,
	/// Only set while the state is being built.
	transition: Option<Transition>,
	failure: OnceLock<StateError>,
}

impl EditorState {
	/// Creates the first state for an extension set.
	///
	/// # Errors
	///
	/// Returns [`StateError::CyclicDependency`] if a slot depends on itself.
	pub fn create(config: EditorStateConfig) -> Result<Arc<Self>, StateError> {
		let extension = Extension::sequence(config.extensions);
		let config = Arc::new(Configuration::resolve(&extension, None)?);
		Self::build(config, None)
	}

	pub(crate) fn build(config: Arc<Configuration>, transition: Option<Transition>) -> Result<Arc<Self>, StateError> {
		let slots = config.dynamic_slots.len();
		let mut state = Self {
			values: (0..slots).map(|_| OnceLock::new()).collect(),
			status: config
				.status_template
				.iter()
				.map(|status| AtomicU8::new(status.bits()))
				.collect(),
			config,
			transition,
			failure: OnceLock::new(),
		};
		for index in 0..slots {
			if let Err(err) = state.ensure_addr(Address::dynamic(index)) {
				return Err(state.failure.take().unwrap_or(err));
			}
		}
		if let Some(err) = state.failure.take() {
			return Err(err);
		}
		state.transition = None;
		Ok(Arc::new(state))
	}

	pub fn configuration(&self) -> &Arc<Configuration> {
		&self.config
	}

	/// Reads the combined output of `facet`.
	///
	/// Facets with no provider in this state's configuration yield their default.
	pub fn facet<I: FacetInput, O: StateValue>(&self, facet: &Facet<I, O>) -> Result<Arc<O>, StateError> {
		match self.config.address_of(facet.id()) {
			Some(addr) => {
				self.ensure_addr(addr)?;
				downcast(self.get_addr(addr)?, facet.id())
			}
			None => facet.default_value(),
		}
	}

	/// Reads the value of `field`.
	///
	/// # Errors
	///
	/// Returns [`StateError::FieldNotPresent`] if the configuration lacks the field.
	pub fn field<V: StateValue>(&self, field: &StateField<V>) -> Result<Arc<V>, StateError> {
		self.field_by_id(field.id())
	}

	/// Reads the value of `field`, or `None` if the configuration lacks it.
	pub fn try_field<V: StateValue>(&self, field: &StateField<V>) -> Result<Option<Arc<V>>, StateError> {
		if !self.config.has_entity(field.id()) {
			return Ok(None);
		}
		self.field_by_id(field.id()).map(Some)
	}

	pub(crate) fn field_by_id<V: StateValue>(&self, id: crate::EntityId) -> Result<Arc<V>, StateError> {
		let addr = self
			.config
			.address_of(id)
			.ok_or(StateError::FieldNotPresent { field: id })?;
		self.ensure_addr(addr)?;
		downcast(self.get_addr(addr)?, id)
	}

	/// Makes sure the slot at `addr` is computed and returns its status.
	pub(crate) fn ensure_addr(&self, addr: Address) -> Result<SlotStatus, StateError> {
		if addr.is_static() {
			return Ok(SlotStatus::COMPUTED);
		}
		let index = addr.index();
		let (Some(cell), Some(slot)) = (self.status.get(index), self.config.dynamic_slots.get(index)) else {
			return Err(StateError::UnresolvedSlot { slot: index });
		};

		let status = SlotStatus::from_bits_truncate(cell.load(Ordering::Acquire));
		if status.contains(SlotStatus::COMPUTING) {
			let err = StateError::CyclicDependency {
				slot: index,
				owner: slot.owner(),
			};
			tracing::warn!(slot = index, owner = %slot.owner(), "cyclic dependency between state slots");
			let _ = self.failure.set(err.clone());
			return Err(err);
		}
		if status.contains(SlotStatus::COMPUTED) {
			return Ok(status);
		}

		cell.store(SlotStatus::COMPUTING.bits(), Ordering::Release);
		let changed = match slot.update(self, index, self.transition.as_ref()) {
			Ok(changed) => changed,
			Err(err) => {
				// The first failure decides the build, even if a reader swallows it.
				cell.store(SlotStatus::empty().bits(), Ordering::Release);
				let _ = self.failure.set(err.clone());
				return Err(err);
			}
		};
		let status = if changed {
			SlotStatus::COMPUTED | SlotStatus::CHANGED
		} else {
			SlotStatus::COMPUTED
		};
		cell.store(status.bits(), Ordering::Release);
		tracing::trace!(slot = index, owner = %slot.owner(), changed, "computed dynamic slot");
		Ok(status)
	}

	/// Reads the slot at `addr` without computing it.
	pub(crate) fn get_addr(&self, addr: Address) -> Result<&Value, StateError> {
		let value = if addr.is_static() {
			self.config.static_values.get(addr.index())
		} else {
			self.values.get(addr.index()).and_then(OnceLock::get)
		};
		value.ok_or(StateError::UnresolvedSlot { slot: addr.index() })
	}

	pub(crate) fn store(&self, index: usize, value: Value) {
		let stored = self.values.get(index).is_some_and(|cell| cell.set(value).is_ok());
		debug_assert!(stored, "dynamic slot {index} written twice");
	}
}

impl core::fmt::Debug for EditorState {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("EditorState")
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

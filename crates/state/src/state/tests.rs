use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::id::IdRegistry;
use crate::{Dependency, Precedence};

/// Field counting document changes.
fn doc_counter(ids: &IdRegistry) -> StateField<u32> {
	StateField::define(
		ids,
		|_| Ok(0),
		|v, tr, _| Ok(if tr.doc_changed() { v + 1 } else { *v }),
	)
}

fn sum_facet(ids: &IdRegistry, calls: Arc<AtomicUsize>) -> Facet<u32, u32> {
	Facet::<u32>::builder()
		.combine(move |values: &[u32]| {
			calls.fetch_add(1, Ordering::Relaxed);
			values.iter().sum()
		})
		.build(ids)
}

fn slot_status<I: FacetInput, O: StateValue>(state: &EditorState, facet: &Facet<I, O>) -> SlotStatus {
	let addr = state.config.address_of(facet.id()).unwrap();
	assert!(!addr.is_static());
	SlotStatus::from_bits_truncate(state.status[addr.index()].load(Ordering::Acquire))
}

#[test]
fn field_is_created_then_updated() {
	let ids = IdRegistry::new();
	let field = doc_counter(&ids);
	let s0 = EditorState::create(EditorStateConfig::new().extension(&field)).unwrap();
	assert_eq!(*s0.field(&field).unwrap(), 0);

	let s1 = Transition::new(&s0).changes_doc().apply().unwrap();
	assert_eq!(*s1.field(&field).unwrap(), 1);
	assert!(Arc::ptr_eq(&s0.config, &s1.config));
}

#[test]
fn unchanged_field_keeps_previous_value() {
	let ids = IdRegistry::new();
	let field = doc_counter(&ids);
	let s0 = EditorState::create(EditorStateConfig::new().extension(&field)).unwrap();
	let s1 = Transition::new(&s0).changes_selection().apply().unwrap();

	assert!(Arc::ptr_eq(&s0.field(&field).unwrap(), &s1.field(&field).unwrap()));
}

#[test]
fn untouched_field_does_not_cascade_into_facet() {
	let ids = IdRegistry::new();
	let calls = Arc::new(AtomicUsize::new(0));
	let facet = sum_facet(&ids, calls.clone());
	let field = doc_counter(&ids).provide(&facet, |v| *v, None).unwrap();
	let s0 = EditorState::create(EditorStateConfig::new().extension(&field).extension(facet.of(10))).unwrap();
	assert_eq!(*s0.facet(&facet).unwrap(), 10);
	let after_create = calls.load(Ordering::Relaxed);

	let s1 = Transition::new(&s0).changes_selection().apply().unwrap();
	assert_eq!(calls.load(Ordering::Relaxed), after_create);
	assert!(!slot_status(&s1, &facet).contains(SlotStatus::CHANGED));
	assert!(Arc::ptr_eq(&s0.facet(&facet).unwrap(), &s1.facet(&facet).unwrap()));

	let s2 = Transition::new(&s1).changes_doc().apply().unwrap();
	assert_eq!(calls.load(Ordering::Relaxed), after_create + 1);
	assert!(slot_status(&s2, &facet).contains(SlotStatus::CHANGED));
	assert_eq!(*s2.facet(&facet).unwrap(), 11);
}

#[test]
fn equal_combined_output_reports_unchanged() {
	let ids = IdRegistry::new();
	let parity = Facet::<u32>::builder()
		.combine(|values: &[u32]| values.iter().sum::<u32>() % 2)
		.build(&ids);
	let twice = StateField::define(
		&ids,
		|_| Ok(0u32),
		|v, tr, _| Ok(if tr.doc_changed() { v + 2 } else { *v }),
	)
	.provide(&parity, |v| *v, None)
	.unwrap();
	let s0 = EditorState::create(EditorStateConfig::new().extension(&twice)).unwrap();
	let s1 = Transition::new(&s0).changes_doc().apply().unwrap();

	assert_eq!(*s1.field(&twice).unwrap(), 2);
	assert!(!slot_status(&s1, &parity).contains(SlotStatus::CHANGED));
	assert!(Arc::ptr_eq(&s0.facet(&parity).unwrap(), &s1.facet(&parity).unwrap()));
}

#[test]
fn doc_dependency_recomputes_only_on_doc_change() {
	let ids = IdRegistry::new();
	let runs = Arc::new(AtomicUsize::new(0));
	let facet = Facet::<usize>::define(&ids);
	let counted = runs.clone();
	let ext = facet
		.compute([Dependency::DocChanged], move |_| Ok(counted.fetch_add(1, Ordering::Relaxed)))
		.unwrap();
	let s0 = EditorState::create(EditorStateConfig::new().extension(ext)).unwrap();
	assert_eq!(runs.load(Ordering::Relaxed), 1);

	let s1 = Transition::new(&s0).changes_selection().apply().unwrap();
	assert_eq!(runs.load(Ordering::Relaxed), 1);
	assert_eq!(*s1.facet(&facet).unwrap(), vec![0]);

	let s2 = Transition::new(&s1).changes_doc().apply().unwrap();
	assert_eq!(runs.load(Ordering::Relaxed), 2);
	assert_eq!(*s2.facet(&facet).unwrap(), vec![1]);
}

#[test]
fn selection_dependency_fires_on_doc_change() {
	let ids = IdRegistry::new();
	let runs = Arc::new(AtomicUsize::new(0));
	let facet = Facet::<usize>::define(&ids);
	let counted = runs.clone();
	let ext = facet
		.compute([Dependency::SelectionChanged], move |_| Ok(counted.fetch_add(1, Ordering::Relaxed)))
		.unwrap();
	let s0 = EditorState::create(EditorStateConfig::new().extension(ext)).unwrap();

	let s1 = Transition::new(&s0).apply().unwrap();
	assert_eq!(runs.load(Ordering::Relaxed), 1);
	let s2 = Transition::new(&s1).changes_doc().apply().unwrap();
	assert_eq!(runs.load(Ordering::Relaxed), 2);
	Transition::new(&s2).changes_selection().apply().unwrap();
	assert_eq!(runs.load(Ordering::Relaxed), 3);
}

#[test]
fn equal_recomputed_input_is_discarded() {
	let ids = IdRegistry::new();
	let calls = Arc::new(AtomicUsize::new(0));
	let facet = sum_facet(&ids, calls.clone());
	let ext = facet.compute([Dependency::DocChanged], |_| Ok(5)).unwrap();
	let s0 = EditorState::create(EditorStateConfig::new().extension(ext)).unwrap();
	let after_create = calls.load(Ordering::Relaxed);

	let s1 = Transition::new(&s0).changes_doc().apply().unwrap();
	assert_eq!(calls.load(Ordering::Relaxed), after_create);
	assert!(!slot_status(&s1, &facet).contains(SlotStatus::CHANGED));
}

#[test]
fn custom_input_comparison_suppresses_changes() {
	let ids = IdRegistry::new();
	let facet = Facet::<u32>::builder()
		.compare_input(|a: &u32, b: &u32| a / 10 == b / 10)
		.build(&ids);
	let field = doc_counter(&ids).provide(&facet, |v| *v, None).unwrap();
	let s0 = EditorState::create(EditorStateConfig::new().extension(&field)).unwrap();
	let s1 = Transition::new(&s0).changes_doc().apply().unwrap();

	assert_eq!(*s1.field(&field).unwrap(), 1);
	assert_eq!(*s1.facet(&facet).unwrap(), vec![0]);
}

#[test]
fn facet_dependency_chains_through_providers() {
	let ids = IdRegistry::new();
	let field = doc_counter(&ids);
	let base = Facet::<u32>::builder()
		.combine(|values: &[u32]| values.iter().sum::<u32>())
		.build(&ids);
	let doubled = Facet::<u32>::define(&ids);
	let base_dep = base.clone();
	let field = field.provide(&base, |v| *v, None).unwrap();
	let ext = Extension::from([
		doubled
			.compute([Dependency::from(&base)], move |state| Ok(*state.facet(&base_dep)? * 2))
			.unwrap(),
		field.extension(),
	]);
	let s0 = EditorState::create(EditorStateConfig::new().extension(ext)).unwrap();
	let s1 = Transition::new(&s0).changes_doc().apply().unwrap();
	let s2 = Transition::new(&s1).changes_doc().apply().unwrap();

	assert_eq!(*s0.facet(&doubled).unwrap(), vec![0]);
	assert_eq!(*s2.facet(&doubled).unwrap(), vec![4]);
}

#[test]
fn multi_provider_splices_in_group_order() {
	let ids = IdRegistry::new();
	let facet = Facet::<u32>::define(&ids);
	let ext = Extension::from([
		facet.compute_n([], |_| Ok(vec![1, 2])).unwrap(),
		facet.compute([], |_| Ok(3)).unwrap(),
	]);
	let state = EditorState::create(EditorStateConfig::new().extension(ext)).unwrap();

	assert_eq!(*state.facet(&facet).unwrap(), vec![1, 2, 3]);
}

#[test]
fn mutual_facet_dependency_is_a_cycle() {
	let ids = IdRegistry::new();
	let a = Facet::<u32>::define(&ids);
	let b = Facet::<u32>::define(&ids);
	let (read_a, read_b) = (a.clone(), b.clone());
	let ext = Extension::from([
		a.compute([Dependency::from(&b)], move |state| Ok(state.facet(&read_b)?.len() as u32))
			.unwrap(),
		b.compute([Dependency::from(&a)], move |state| Ok(state.facet(&read_a)?.len() as u32))
			.unwrap(),
	]);

	let err = EditorState::create(EditorStateConfig::new().extension(ext)).unwrap_err();
	assert!(matches!(err, StateError::CyclicDependency { .. }));
}

#[test]
fn field_reading_itself_is_a_cycle() {
	let ids = IdRegistry::new();
	let slot: Arc<OnceLock<StateField<u32>>> = Arc::new(OnceLock::new());
	let this = slot.clone();
	let field = StateField::define(
		&ids,
		move |state| match this.get() {
			Some(field) => Ok(*state.field(field)? + 1),
			None => Ok(0),
		},
		|v, _, _| Ok(*v),
	);
	let _ = slot.set(field.clone());

	let err = EditorState::create(EditorStateConfig::new().extension(&field)).unwrap_err();
	assert_eq!(
		err,
		StateError::CyclicDependency {
			slot: 0,
			owner: field.id()
		}
	);
}

#[test]
fn swallowed_cycle_still_fails_the_build() {
	let ids = IdRegistry::new();
	let a = Facet::<u32>::define(&ids);
	let b = Facet::<u32>::define(&ids);
	let (read_a, read_b) = (a.clone(), b.clone());
	let ext = Extension::from([
		a.compute([], move |state| Ok(state.facet(&read_b).map_or(0, |v| v.len() as u32)))
			.unwrap(),
		b.compute([], move |state| Ok(state.facet(&read_a).map_or(0, |v| v.len() as u32)))
			.unwrap(),
	]);

	let result = EditorState::create(EditorStateConfig::new().extension(ext));
	assert!(matches!(result, Err(StateError::CyclicDependency { .. })));
}

#[test]
fn swallowed_update_error_fails_with_its_cause() {
	let ids = IdRegistry::new();
	let absent = doc_counter(&ids);
	let absent_id = absent.id();
	let failing = StateField::define(&ids, move |state| state.field(&absent).map(|v| *v), |v: &u32, _, _| Ok(*v));
	let read = failing.clone();
	let reader = StateField::define(
		&ids,
		move |state| Ok(state.field(&read).map_or(99, |v| *v)),
		|v: &u32, _, _| Ok(*v),
	);

	let err = EditorState::create(EditorStateConfig::new().extension(&reader).extension(&failing)).unwrap_err();
	assert_eq!(err, StateError::FieldNotPresent { field: absent_id });
}

#[test]
fn multi_provider_compares_lists_element_wise() {
	let ids = IdRegistry::new();
	let field = doc_counter(&ids);
	let facet = Facet::<u32>::define(&ids);
	let source = field.clone();
	let ext = facet
		.compute_n([Dependency::DocChanged], move |state| {
			let len = if *state.field(&source)? < 2 { 2 } else { 3 };
			Ok(vec![1; len])
		})
		.unwrap();
	let s0 = EditorState::create(EditorStateConfig::new().extension(&field).extension(ext)).unwrap();

	let s1 = Transition::new(&s0).changes_doc().apply().unwrap();
	assert!(!slot_status(&s1, &facet).contains(SlotStatus::CHANGED));
	assert!(Arc::ptr_eq(&s0.facet(&facet).unwrap(), &s1.facet(&facet).unwrap()));

	let s2 = Transition::new(&s1).changes_doc().apply().unwrap();
	assert!(slot_status(&s2, &facet).contains(SlotStatus::CHANGED));
	assert_eq!(*s2.facet(&facet).unwrap(), vec![1, 1, 1]);
}

#[test]
fn reconfigure_creates_newly_added_computed_facet() {
	let ids = IdRegistry::new();
	let field = doc_counter(&ids);
	let scaled = Facet::<u32>::define(&ids);
	let s0 = EditorState::create(EditorStateConfig::new().extension(&field)).unwrap();
	let s1 = Transition::new(&s0).changes_doc().apply().unwrap();
	assert_eq!(*s1.facet(&scaled).unwrap(), Vec::<u32>::new());

	let source = field.clone();
	let ext = scaled
		.compute([Dependency::from(&field)], move |state| Ok(*state.field(&source)? * 10))
		.unwrap();
	let s2 = Transition::new(&s1)
		.reconfigure(Extension::from([field.extension(), ext]))
		.apply()
		.unwrap();

	assert_eq!(*s2.facet(&scaled).unwrap(), vec![10]);
	assert!(slot_status(&s2, &scaled).contains(SlotStatus::CHANGED));
}

#[test]
fn absent_field_reads() {
	let ids = IdRegistry::new();
	let present = doc_counter(&ids);
	let absent = doc_counter(&ids);
	let state = EditorState::create(EditorStateConfig::new().extension(&present)).unwrap();

	assert_eq!(state.try_field(&absent).unwrap(), None);
	assert_eq!(
		state.field(&absent).unwrap_err(),
		StateError::FieldNotPresent { field: absent.id() }
	);
	assert_eq!(state.try_field(&present).unwrap().as_deref(), Some(&0));
}

#[test]
fn facet_without_providers_reads_default() {
	let ids = IdRegistry::new();
	let facet = Facet::<u32>::define(&ids);
	let state = EditorState::create(EditorStateConfig::new()).unwrap();
	assert_eq!(*state.facet(&facet).unwrap(), Vec::<u32>::new());
}

#[test]
fn reconfigure_carries_fields_across_new_layout() {
	let ids = IdRegistry::new();
	let kept = doc_counter(&ids);
	let added = StateField::define(&ids, |_| Ok(String::from("fresh")), |v: &String, _, _| Ok(v.clone()));
	let s0 = EditorState::create(EditorStateConfig::new().extension(&kept)).unwrap();
	let s1 = Transition::new(&s0).changes_doc().apply().unwrap();

	let s2 = Transition::new(&s1)
		.reconfigure(Extension::from([Extension::from(&added), Extension::from(&kept)]))
		.apply()
		.unwrap();

	assert!(!Arc::ptr_eq(&s1.config, &s2.config));
	assert_eq!(*s2.field(&kept).unwrap(), 1);
	assert_eq!(s2.field(&added).unwrap().as_str(), "fresh");
}

#[test]
fn reconfigure_preserves_equal_static_facet_by_reference() {
	let ids = IdRegistry::new();
	let facet = Facet::<u32>::builder().static_only().build(&ids);
	let other = Facet::<u32>::define(&ids);
	let s0 = EditorState::create(EditorStateConfig::new().extension(facet.of(1))).unwrap();

	let s1 = Transition::new(&s0)
		.reconfigure(Extension::from([facet.of(1), other.of(2)]))
		.apply()
		.unwrap();

	assert!(Arc::ptr_eq(&s0.facet(&facet).unwrap(), &s1.facet(&facet).unwrap()));
	assert_eq!(*s1.facet(&other).unwrap(), vec![2]);
}

#[test]
fn reconfigure_recomputes_computed_providers() {
	let ids = IdRegistry::new();
	let runs = Arc::new(AtomicUsize::new(0));
	let facet = Facet::<u32>::define(&ids);
	let counted = runs.clone();
	let ext = facet
		.compute([], move |_| {
			counted.fetch_add(1, Ordering::Relaxed);
			Ok(7)
		})
		.unwrap();
	let s0 = EditorState::create(EditorStateConfig::new().extension(ext.clone())).unwrap();
	let s1 = Transition::new(&s0)
		.reconfigure(Precedence::Fallback.wrap(ext))
		.apply()
		.unwrap();

	assert_eq!(runs.load(Ordering::Relaxed), 2);
	assert_eq!(*s1.facet(&facet).unwrap(), vec![7]);
	assert!(Arc::ptr_eq(&s0.facet(&facet).unwrap(), &s1.facet(&facet).unwrap()));
}

#[derive(Debug, Clone, Copy)]
struct Flags {
	doc: bool,
	selection: bool,
}

fn arb_flags() -> impl Strategy<Value = Flags> {
	(any::<bool>(), any::<bool>()).prop_map(|(doc, selection)| Flags { doc, selection })
}

fn apply_flags(start: &Arc<EditorState>, flags: Flags) -> Arc<EditorState> {
	let mut tr = Transition::new(start);
	if flags.doc {
		tr = tr.changes_doc();
	}
	if flags.selection {
		tr = tr.changes_selection();
	}
	tr.apply().unwrap()
}

proptest! {
	/// Replaying a transition against the same start state yields equal slots.
	#[test]
	fn prop_transitions_are_deterministic(history in prop::collection::vec(arb_flags(), 1..12)) {
		let ids = IdRegistry::new();
		let facet = Facet::<u32>::builder()
			.combine(|values: &[u32]| values.iter().sum::<u32>())
			.build(&ids);
		let field = doc_counter(&ids).provide(&facet, |v| *v, None).unwrap();
		let selection_facet = Facet::<u32>::define(&ids);
		let read = facet.clone();
		let ext = Extension::from([
			field.extension(),
			selection_facet
				.compute([Dependency::SelectionChanged, Dependency::from(&facet)], move |state| {
					Ok(*state.facet(&read)? + 1)
				})
				.unwrap(),
		]);

		let mut state = EditorState::create(EditorStateConfig::new().extension(ext)).unwrap();
		for flags in history {
			let first = apply_flags(&state, flags);
			let second = apply_flags(&state, flags);
			prop_assert_eq!(first.field(&field).unwrap(), second.field(&field).unwrap());
			prop_assert_eq!(first.facet(&facet).unwrap(), second.facet(&facet).unwrap());
			prop_assert_eq!(
				first.facet(&selection_facet).unwrap(),
				second.facet(&selection_facet).unwrap()
			);
			state = first;
		}
	}
}

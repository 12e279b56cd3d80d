//! End-to-end composition scenarios.

#![allow(unused_crate_dependencies)]

use std::sync::Arc;

use xeno_state::{
	Configuration, Dependency, EditorState, EditorStateConfig, Extension, Facet, IdRegistry,
	Precedence, StateError, StateField, Transition,
};

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn tab_size(ids: &IdRegistry) -> Facet<usize, usize> {
	Facet::<usize>::builder()
		.combine(|values: &[usize]| values.last().copied().unwrap_or(4))
		.static_only()
		.build(ids)
}

#[test]
fn tab_size_keeps_last_and_follows_reconfiguration() -> Result<(), StateError> {
	init_tracing();
	let ids = IdRegistry::new();
	let tab_size = tab_size(&ids);
	assert_eq!(*tab_size.default_value()?, 4);

	let s0 = EditorState::create(
		EditorStateConfig::new()
			.extension(tab_size.of(2))
			.extension(tab_size.of(8)),
	)?;
	assert_eq!(*s0.facet(&tab_size)?, 8);

	let s1 = Transition::new(&s0).reconfigure(tab_size.of(2)).apply()?;
	assert_eq!(*s1.facet(&tab_size)?, 2);
	assert!(!Arc::ptr_eq(&s0.facet(&tab_size)?, &s1.facet(&tab_size)?));
	Ok(())
}

#[test]
fn static_facet_matches_combined_inputs() -> Result<(), StateError> {
	let ids = IdRegistry::new();
	let tab_size = tab_size(&ids);
	let config = Configuration::resolve(&Extension::from([tab_size.of(3), tab_size.of(5)]), None)?;
	assert_eq!(config.static_facet(&tab_size)?.as_deref(), Some(&5));
	Ok(())
}

#[test]
fn precedence_beats_source_order() -> Result<(), StateError> {
	let ids = IdRegistry::new();
	let tab_size = tab_size(&ids);
	let state = EditorState::create(
		EditorStateConfig::new()
			.extension(Precedence::Fallback.wrap(tab_size.of(1)))
			.extension(Precedence::Override.wrap(tab_size.of(2)))
			.extension(tab_size.of(3)),
	)?;
	// Keep-last picks the lowest-precedence input.
	assert_eq!(*state.facet(&tab_size)?, 1);
	Ok(())
}

#[test]
fn independent_extensions_compose() -> Result<(), StateError> {
	init_tracing();
	let ids = IdRegistry::new();
	let line_count = StateField::define(
		&ids,
		|_| Ok(1usize),
		|lines, tr, _| Ok(if tr.doc_changed() { lines + 1 } else { *lines }),
	);
	let gutter_width = Facet::<usize>::builder()
		.combine(|widths: &[usize]| widths.iter().copied().max().unwrap_or(0))
		.build(&ids);
	let width_source = line_count.clone();
	let gutter = gutter_width.compute([Dependency::from(&line_count)], move |state| {
		Ok(state.field(&width_source)?.to_string().len() + 1)
	})?;
	let minimum = gutter_width.of(2);

	let s0 = EditorState::create(
		EditorStateConfig::new()
			.extension(&line_count)
			.extension(gutter)
			.extension(minimum),
	)?;
	assert_eq!(*s0.facet(&gutter_width)?, 2);

	let mut state = s0;
	for _ in 0..10 {
		state = Transition::new(&state).changes_doc().apply()?;
	}
	assert_eq!(*state.field(&line_count)?, 11);
	assert_eq!(*state.facet(&gutter_width)?, 3);
	Ok(())
}

#[test]
fn newly_added_field_is_created_on_reconfigure() -> Result<(), StateError> {
	let ids = IdRegistry::new();
	let tab_size = tab_size(&ids);
	let history = StateField::define(&ids, |_| Ok(Vec::<u32>::new()), |h: &Vec<u32>, _, _| Ok(h.clone()));
	let s0 = EditorState::create(EditorStateConfig::new().extension(tab_size.of(2)))?;
	assert_eq!(s0.try_field(&history)?, None);

	let s1 = Transition::new(&s0)
		.reconfigure(Extension::from([s0.configuration().source().clone(), history.extension()]))
		.apply()?;
	assert_eq!(*s1.field(&history)?, Vec::<u32>::new());
	assert!(Arc::ptr_eq(&s0.facet(&tab_size)?, &s1.facet(&tab_size)?));
	Ok(())
}

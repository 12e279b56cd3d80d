//! Extension composition and incremental evaluation for editor state.
//!
//! Independently written extensions contribute inputs to shared aggregation
//! points ([`Facet`]s) and carry typed values across states
//! ([`StateField`]s) without knowing about each other. Each new
//! [`EditorState`] is derived from the previous one through a
//! [`Transition`], recomputing only the slots whose inputs changed.
//!
//! # Pipeline
//!
//! 1. An [`Extension`] tree is flattened into a deduplicated list ordered by
//!    [`Precedence`].
//! 2. The list is resolved into a [`Configuration`]: fixed facet outputs are
//!    combined once, everything else gets a per-state slot.
//! 3. Each state evaluates its slots lazily, memoizing results and
//!    detecting dependency cycles.
//!
//! # Example
//!
//! ```
//! use xeno_state::{EditorState, EditorStateConfig, Facet, IdRegistry};
//!
//! let ids = IdRegistry::new();
//! let tab_size = Facet::<usize>::builder()
//! 	.combine(|values: &[usize]| values.last().copied().unwrap_or(4))
//! 	.static_only()
//! 	.build(&ids);
//!
//! let state = EditorState::create(
//! 	EditorStateConfig::new()
//! 		.extension(tab_size.of(2))
//! 		.extension(tab_size.of(8)),
//! )?;
//! assert_eq!(*state.facet(&tab_size)?, 8);
//! # Ok::<(), xeno_state::StateError>(())
//! ```
#![cfg_attr(test, allow(unused_crate_dependencies))]

mod config;
mod error;
mod extension;
mod facet;
mod field;
mod id;
mod slot;
mod state;
mod value;

pub use config::Configuration;
pub use error::StateError;
pub use extension::{Extension, Precedence};
pub use facet::{Dependency, Facet, FacetBuilder, ProviderKind};
pub use field::{FieldBuilder, StateField};
pub use id::{EntityId, IdRegistry};
pub use state::{EditorState, EditorStateConfig, Transition};
pub use value::{FacetInput, StateValue};

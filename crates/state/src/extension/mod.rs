//! Extension trees and their flattening into an ordered contribution list.
//!
//! # Flattening rules
//!
//! - Each extension node contributes once, no matter how often it occurs in
//!   the tree. Identity is the node itself: clones of one [`Extension`] are
//!   the same node, two separately built extensions never are.
//! - Leaves are bucketed by [`Precedence`] and the buckets are concatenated
//!   from [`Precedence::Override`] down to [`Precedence::Fallback`].
//! - Within a bucket, leaves keep tree pre-order.
//! - A precedence wrapper rebinds the tier for its whole subtree; the
//!   innermost wrapper wins. The tier outside any wrapper is
//!   [`Precedence::Default`].
//! - A field's attached facet contributions are flattened right after the
//!   field, at the field's tier.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::facet::Provider;
use crate::field::FieldDyn;


/// Priority tier ordering contributions to the same facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Precedence {
	/// Comes before everything else.
	Override,
	/// Comes before default-tier contributions.
	Extend,
	/// The tier of unwrapped extensions.
	#[default]
	Default,
	/// Comes after everything else.
	Fallback,
}

impl Precedence {
	const COUNT: usize = 4;

	/// Position of the tier in flattened order, `0` first.
	pub const fn rank(self) -> usize {
		match self {
			Self::Override => 0,
			Self::Extend => 1,
			Self::Default => 2,
			Self::Fallback => 3,
		}
	}

	/// Wraps `extension` so that its whole subtree sits in this tier.
	pub fn wrap(self, extension: impl Into<Extension>) -> Extension {
		Extension::new(ExtensionNode::Precedence(self, extension.into()))
	}
}

pub(crate) enum ExtensionNode {
	Provider(Arc<Provider>),
	Field {
		field: Arc<dyn FieldDyn>,
		provides: Vec<Extension>,
	},
	Sequence(Vec<Extension>),
	Precedence(Precedence, Extension),
}

/// A composable unit of state configuration.
///
/// Built from facet providers ([`Facet::of`], [`Facet::compute`]), fields,
/// sequences of extensions and precedence wrappers.
///
/// [`Facet::of`]: crate::Facet::of
/// [`Facet::compute`]: crate::Facet::compute
#[derive(Clone)]
pub struct Extension(Arc<ExtensionNode>);

impl Extension {
	fn new(node: ExtensionNode) -> Self {
		Self(Arc::new(node))
	}

	pub(crate) fn provider(provider: Provider) -> Self {
		Self::new(ExtensionNode::Provider(Arc::new(provider)))
	}

	pub(crate) fn field(field: Arc<dyn FieldDyn>, provides: Vec<Extension>) -> Self {
		Self::new(ExtensionNode::Field { field, provides })
	}

	/// An ordered group of extensions.
	pub fn sequence(extensions: impl IntoIterator<Item = Extension>) -> Self {
		Self::new(ExtensionNode::Sequence(extensions.into_iter().collect()))
	}

	/// An extension contributing nothing.
	pub fn empty() -> Self {
		Self::sequence([])
	}

	/// Places this extension in the given precedence tier.
	pub fn with_precedence(self, precedence: Precedence) -> Self {
		precedence.wrap(self)
	}

	fn token(&self) -> usize {
		Arc::as_ptr(&self.0) as *const () as usize
	}
}

impl Default for Extension {
	fn default() -> Self {
		Self::empty()
	}
}

impl core::fmt::Debug for Extension {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match &*self.0 {
			ExtensionNode::Provider(provider) => f.debug_tuple("Provider").field(provider).finish(),
			ExtensionNode::Field { field, provides } => f
				.debug_struct("Field")
				.field("id", &field.id())
				.field("provides", provides)
				.finish(),
			ExtensionNode::Sequence(items) => f.debug_list().entries(items).finish(),
			ExtensionNode::Precedence(prec, inner) => {
				f.debug_tuple("Precedence").field(prec).field(inner).finish()
			}
		}
	}
}

impl From<Vec<Extension>> for Extension {
	fn from(extensions: Vec<Extension>) -> Self {
		Self::sequence(extensions)
	}
}

impl<const N: usize> From<[Extension; N]> for Extension {
	fn from(extensions: [Extension; N]) -> Self {
		Self::sequence(extensions)
	}
}

impl FromIterator<Extension> for Extension {
	fn from_iter<T: IntoIterator<Item = Extension>>(iter: T) -> Self {
		Self::sequence(iter)
	}
}

/// A flattened contribution.
#[derive(Clone)]
pub(crate) enum Leaf {
	Provider(Arc<Provider>),
	Field(Arc<dyn FieldDyn>),
}

impl core::fmt::Debug for Leaf {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match self {
			Leaf::Provider(p) => write!(f, "Provider({})", p.id),
			Leaf::Field(field) => write!(f, "Field({})", field.id()),
		}
	}
}

/// Flattens `root` into its deduplicated, precedence-ordered leaves.
pub(crate) fn flatten(root: &Extension) -> Vec<Leaf> {
	let mut flattener = Flattener {
		buckets: Default::default(),
		seen: FxHashSet::default(),
	};
	flattener.visit(root, Precedence::Default);
	flattener.buckets.into_iter().flatten().collect()
}

struct Flattener {
	buckets: [Vec<Leaf>; Precedence::COUNT],
	seen: FxHashSet<usize>,
}

impl Flattener {
	fn visit(&mut self, ext: &Extension, prec: Precedence) {
		if !self.seen.insert(ext.token()) {
			return;
		}
		match &*ext.0 {
			ExtensionNode::Provider(provider) => {
				self.buckets[prec.rank()].push(Leaf::Provider(provider.clone()));
			}
			ExtensionNode::Field { field, provides } => {
				self.buckets[prec.rank()].push(Leaf::Field(field.clone()));
				for ext in provides {
					self.visit(ext, prec);
				}
			}
			ExtensionNode::Sequence(items) => {
				for ext in items {
					self.visit(ext, prec);
				}
			}
			ExtensionNode::Precedence(inner_prec, inner) => self.visit(inner, *inner_prec),
		}
	}
}

//! Pattern-compiling trie router.
//!
//! Route patterns such as `/api/{name}/{path}*:action` are compiled into
//! per-segment [`Section`]s and stored in a [`Tree`] whose siblings are kept
//! in specificity order. Lookups walk the tree with full backtracking and
//! return the most specific registered value together with the captured
//! path variables.
//!
//! ```
//! use pathmux_router::Tree;
//!
//! let mut tree = Tree::new();
//! tree.register("/api/{name}/{path}", "item").unwrap();
//! tree.register("/api/{path}*", "files").unwrap();
//!
//! let m = tree.lookup("/api/dog/wang").unwrap();
//! assert_eq!(*m.value, "item");
//! assert_eq!(m.params.get("name"), Some("dog"));
//!
//! let m = tree.lookup("/api/a/b/c").unwrap();
//! assert_eq!(*m.value, "files");
//! assert_eq!(m.params.get("path"), Some("a/b/c"));
//! ```

pub mod matcher;
pub mod params;
pub mod pattern;
pub mod trie;

pub use matcher::{path_tokens, SectionMatch};
pub use params::Params;
pub use pattern::{CompileError, CompileErrorKind, Element, Pattern, Section, Specificity, Validator, Variable};
pub use trie::{InsertError, Match, Tree};

//! mailstack core
//!
//! Building blocks shared by every other crate: the typed task graph,
//! deferred task values, content hashing and template rendering.

pub mod error;
pub mod graph;
pub mod hash;
pub mod template;
pub mod value;

pub use error::{CoreError, Result};
pub use graph::{Deps, RunPolicy, Task, TaskGraph};
pub use hash::{hash_bytes, hash_file, hash_triggers};
pub use template::{TemplateProcessor, insert_path};
pub use value::{Inputs, Outputs, TaskId, Value};

//! Typed operation descriptors
//!
//! A descriptor is a name bound to concrete input and output types. The
//! constructors are `const`, so descriptors are usually declared as statics
//! shared by the workflow implementation and its callers:
//!
//! ```
//! use typeflow::descriptor::{Signal, Workflow};
//!
//! static GREET: Workflow<String, String> = Workflow::new("Greet");
//! static RENAME: Signal<String> = Signal::new("rename");
//! ```

mod activity;
mod query;
mod signal;
mod update;
mod workflow;

pub use activity::{Activity, ActivityContext};
pub use query::Query;
pub use signal::Signal;
pub use update::Update;
pub use workflow::Workflow;

/// Panic with "no <kind> name" when a descriptor was declared without a name
pub(crate) fn require_name(kind: &str, name: &str) {
    if name.is_empty() {
        panic!("no {} name", kind);
    }
}

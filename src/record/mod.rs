pub mod methods;
pub mod record;

pub use methods::{FieldMethod, MethodRegistry, TypeMethods};
pub use record::{BuildOptions, ErrorBag, Record, SetOptions, WILDCARD};

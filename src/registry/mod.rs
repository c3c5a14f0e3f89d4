pub mod listeners;
pub mod operations;

pub use listeners::{Filter, Listener, ListenerMode, ListenerRegistry, ValueCallback};
pub use operations::{Operation, OperationRegistry};

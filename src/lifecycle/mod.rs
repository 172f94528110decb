//! Process lifecycle management

mod shutdown;

pub use shutdown::{ShutdownKind, ShutdownSignal};

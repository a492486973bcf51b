//! # Runtime Module
//!
//! Runtime components for the Revision Controller: initialization, the
//! dispatcher, the watch loop and error handling.

pub mod dispatcher;
pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use dispatcher::{Dispatcher, PassRunner, Trigger};
pub use error_policy::*;
pub use initialization::*;
pub use watch_loop::*;

pub mod catalog;
pub mod confirm;
pub mod dispatcher;
pub mod errors;
pub mod feedback;
pub mod message;
pub mod navigation;
pub mod phrases;
pub mod session;
pub mod state;

use serde::{Deserialize, Serialize};

/// Logical switch signal, already stripped of whatever device produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Next,
    Activate,
    Exit,
}

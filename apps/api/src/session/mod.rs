// Session Manager: the one stateful component of the product.
// Owns the signed-in session, its persisted snapshot, and the navigation and
// notification side effects of login, signup, logout, and profile updates.

pub mod effects;
pub mod handlers;
pub mod manager;
pub mod state;

pub use manager::{SessionError, SessionManager};
pub use state::SessionState;

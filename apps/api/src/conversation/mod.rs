//! Live interview turn-taking: the state machine, its collaborators and the
//! WebSocket transport that connects it to a browser.

pub mod capabilities;
pub mod engine;
pub mod live;
pub mod segment;
pub mod state;

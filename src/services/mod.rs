//! Task loops and command surface built on top of the shared runtime.

pub mod autosave;
pub mod countdown;
pub mod room_watch;
pub mod session_service;

mod base;

pub use base::{EngineEvent, EventBus, EventEmitter, NoteLevel};

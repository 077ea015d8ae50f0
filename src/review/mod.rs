//! The QC review workflow.
//!
//! Layout follows an explicit state machine split: session state,
//! events, effects as data, a pure transition function, and an engine
//! whose interpreter executes effects against the transport, the
//! transform pipeline, and the asset store.

pub mod effect;
pub mod engine;
pub mod event;
pub mod finalize;
pub mod session;
pub mod store;
pub mod transition;

pub use effect::{Effect, Notice, RenderRequest};
pub use engine::{Attachment, CreateSessionError, ReviewEngine, Submission, Transport};
pub use event::ReviewEvent;
pub use finalize::{Destination, FinalReport};
pub use session::{ChannelContext, ImageRecord, ImageStatus, ReviewSession, SessionKey, SubmitterId};
pub use store::{SessionHandle, SessionStore};

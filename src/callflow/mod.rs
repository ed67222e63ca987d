//! Call-control state machine for the information line.
//!
//! Each provider callback is handled in isolation: the webhook resolves the
//! logical call, builds a [`CallEvent`], and [`CallFlow::handle`] returns the
//! audit lines to persist together with the next instruction document.

pub mod escalation;
pub mod identity;
pub mod machine;
pub mod twiml;
pub mod urls;

pub use escalation::{escalation_order, DialTarget, PRIORITY_JITTER};
pub use identity::{resolve_sid, CallLeg};
pub use machine::{CallEvent, CallFlow, CallNotice, Transition};
pub use twiml::{TwimlResponse, Verb};
pub use urls::CallbackUrls;

//! Session protocol types
//!
//! JSON messages exchanged with the planning backend over the session socket.
//! Every message is a single text frame holding an object with a `type` tag.

mod messages;
mod types;

pub use messages::{INBOUND_TYPES, InboundMessage, OutboundMessage, ProtocolError, WireQuestion};
pub use types::{Answers, Itinerary, Question};

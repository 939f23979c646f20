#![warn(missing_docs)]
//! Networking for the character simulation: wire protocol, framing codec,
//! authority input buffering, client reconciliation and the peer sessions
//! that tie them to the tick clock.

mod codec;
mod input_queue;
mod prediction;
mod protocol;
mod replay;
mod session;
mod transport;

pub use codec::{
    compute_schema_hash, decode_client_message, decode_server_message, encode_client_message,
    encode_server_message, CodecError, MAX_FRAME_LEN,
};
pub use input_queue::{InputQueue, InputQueueStats, MAX_INPUT_LEAD};
pub use prediction::{PredictedTick, PredictionMetrics, ReconciliationResult, Reconciler};
pub use protocol::*;
pub use replay::{InputLogEntry, InputLogger, ReplayPlayer};
pub use session::{AuthorityPeer, ClientPeer, ClientStatus, SessionWorld};
pub use transport::{LinkConditions, LinkStats, SimulatedLink, Transport};

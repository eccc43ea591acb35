use call_proto::signaling::{CallStatus, IceCandidate};
use serde::Serialize;

/// One call attempt between two users.
///
/// `answered_at` is set exactly once, on the `pending -> accepted`
/// transition. `ended_at` is set exactly once, on entry into a terminal
/// status, at which point the negotiation payload (both SDP strings and
/// both ICE buffers) is cleared.
#[derive(Debug, Clone, Serialize)]
pub struct Call {
    pub id: String,
    pub caller_id: String,
    pub receiver_id: String,
    pub status: CallStatus,
    pub created_at: String,
    pub answered_at: Option<String>,
    pub ended_at: Option<String>,
    pub offer_sdp: Option<String>,
    pub answer_sdp: Option<String>,
    pub caller_ice: Vec<IceCandidate>,
    pub receiver_ice: Vec<IceCandidate>,
}

pub mod signaling {
    use serde::{Deserialize, Serialize};

    /// One proposed network path for a peer connection, discovered and
    /// relayed incrementally while the peers negotiate.
    ///
    /// Candidates are compared structurally on the full triplet when the
    /// server deduplicates a call's per-side buffer.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct IceCandidate {
        pub candidate: String,
        pub sdp_mid: Option<String>,
        pub sdp_mline_index: Option<u16>,
    }

    /// Lifecycle status of a call attempt.
    ///
    /// `pending` may move to `accepted`, `rejected` or `missed`; `accepted`
    /// may move to `completed`. The three right-hand statuses are terminal.
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum CallStatus {
        Pending,
        Accepted,
        Rejected,
        Missed,
        Completed,
    }

    impl CallStatus {
        pub fn as_str(self) -> &'static str {
            match self {
                CallStatus::Pending => "pending",
                CallStatus::Accepted => "accepted",
                CallStatus::Rejected => "rejected",
                CallStatus::Missed => "missed",
                CallStatus::Completed => "completed",
            }
        }

        pub fn parse(value: &str) -> Option<Self> {
            match value {
                "pending" => Some(CallStatus::Pending),
                "accepted" => Some(CallStatus::Accepted),
                "rejected" => Some(CallStatus::Rejected),
                "missed" => Some(CallStatus::Missed),
                "completed" => Some(CallStatus::Completed),
                _ => None,
            }
        }

        /// Terminal statuses admit no further transition.
        pub fn is_terminal(self) -> bool {
            matches!(
                self,
                CallStatus::Rejected | CallStatus::Missed | CallStatus::Completed
            )
        }
    }
}

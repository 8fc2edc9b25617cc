/// Errors raised while decoding a wire envelope. Never fatal to the
/// connection: the message is logged and dropped, the socket stays open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),
    #[error("envelope of type \"event\" is missing the event name")]
    MissingEventName,
    #[error("envelope of type \"callback\" is missing the correlation id")]
    MissingCallbackId,
}

/// A structurally valid request that cannot be honored. The operation is
/// aborted and, when the sender supplied a correlation id, answered with
/// `{success: false}`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("tablet name must not be empty")]
    EmptyTabletName,
    #[error("connection is registered as admin; tablet registration refused")]
    AdminConnection,
    #[error("unknown tablet: {0}")]
    UnknownTablet(String),
    #[error("tablet {0} is not connected")]
    TabletOffline(String),
    #[error("operation requires a tablet connection")]
    NotATablet,
    #[error("missing tablet name and connection is not bound to one")]
    NoBoundTablet,
}

impl ValidationError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::EmptyTabletName => "empty_tablet_name",
            Self::AdminConnection => "admin_connection",
            Self::UnknownTablet(_) => "unknown_tablet",
            Self::TabletOffline(_) => "tablet_offline",
            Self::NotATablet => "not_a_tablet",
            Self::NoBoundTablet => "no_bound_tablet",
        }
    }
}

pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod session;

pub use envelope::{Envelope, EnvelopeKind};
pub use errors::{ProtocolError, ValidationError};
pub use events::{ClientEvent, ServerEvent};
pub use ids::{CallbackId, ConnectionId};
pub use session::{TabletName, TabletSession, TabletStatus};

pub mod envelope;
pub mod messenger;
pub mod origin;
pub mod transport;

pub use envelope::{Envelope, Message, MessageType};
pub use messenger::{Inbound, ListenerHandle, Messenger};
pub use origin::{OriginCell, OriginHandshake, TrustedOrigin};
pub use transport::{ChannelWindow, FrameEndpoint, FrameTransport, FrameWindow, RawFrameEvent};

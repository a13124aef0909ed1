pub mod channel;
pub mod command;
pub mod framing;
pub mod message;

pub use channel::{ChannelId, ChannelReadings};
pub use command::HostCommand;
pub use framing::{FramedLine, LineFramer};
pub use message::{SensorEvent, SensorReading, SequenceId};

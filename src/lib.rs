pub mod pubsub;
pub mod uart;
pub mod config;
pub mod vehicle;
pub mod parts;
pub mod pilot;
pub mod tub;
pub mod manage;

pub use config::Config;
pub use vehicle::{ControlPair, Frame, LoopStats, Memory, Mode, Part, PartError, Vehicle};

pub use pubsub::{
    Message, Topic,
    Publisher, Subscriber,
    TopicRegistry,
};

pub mod fanout;
pub mod gateway;
pub mod registry;
pub mod relay;
pub mod session;

pub use fanout::{Envelope, FanOut, FanOutReport, LocalFanOut};
pub use gateway::{SessionGateway, SessionGuard};
pub use registry::RoomRegistry;
pub use relay::BroadcastRelay;
pub use session::{Delivery, SessionHandle, SessionId};

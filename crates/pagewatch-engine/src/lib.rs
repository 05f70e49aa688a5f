pub mod channel;
pub mod config;
pub mod host;
pub mod monitor;
pub mod observer;
pub mod publisher;
pub mod scheduler;
pub mod serializer;
pub mod transport;

pub use pagewatch_common::dom;
pub use pagewatch_common::error;
pub use pagewatch_common::protocol;
pub use pagewatch_common::value;

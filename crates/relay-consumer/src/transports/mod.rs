pub mod amqp;
pub mod sql;

#[cfg(feature = "fifo")]
pub mod fifo;

pub use amqp::{AmqpTransport, AmqpTransportConfig};
pub use sql::{SqlTransport, SqlTransportConfig};

#[cfg(feature = "fifo")]
pub use fifo::{CloudFifoTransport, CloudFifoTransportConfig};

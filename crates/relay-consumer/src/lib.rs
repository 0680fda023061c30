//! Abstract at-least-once message consumer: a state machine, bounded worker
//! pool, pending-count throttling, and pausable statistics, composed with an
//! interchangeable [`Transport`] (AMQP, SQL lease queue, or cloud FIFO).

mod config;
mod consumer;
mod error;
mod factory;
mod handle;
mod message;
mod processor;
mod registry;
mod state;
mod stats;
mod transport;
pub mod transports;

pub use config::{load, load_consumer_config, ConsumerConfig};
pub use consumer::MessageConsumer;
pub use error::ConsumerError;
pub use factory::{generate_message_consumer, TransportSpec};
pub use handle::ConsumerHandle;
pub use message::{InfoMessage, MessageBatch};
pub use processor::MessageProcessor;
pub use registry::{QueueRegistry, RegistryToken};
pub use state::ConsumerState;
pub use stats::ConsumerStatistics;
pub use transport::Transport;

#[cfg(feature = "fifo")]
pub use factory::generate_cloud_fifo_consumer;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::consumer::MessageConsumer;
use crate::error::ConsumerError;
use crate::processor::MessageProcessor;
use crate::transport::Transport;

/// Object-safe facade over `MessageConsumer<T>`, erasing the transport's
/// associated `RawMessage` type so the factory can hand callers one
/// concrete type regardless of which transport was built underneath.
#[async_trait]
pub trait ConsumerHandle: Send + Sync {
    async fn init(&self) -> Result<(), ConsumerError>;
    async fn consume(&self, processor: Arc<dyn MessageProcessor>) -> Result<(), ConsumerError>;
    async fn destroy(&self) -> Result<(), ConsumerError>;
    async fn wait_until_destroyed(&self);
    fn get_statistics(&self) -> HashMap<&'static str, Option<f64>>;
    fn get_average_round_trip_millis(&self) -> Option<f64>;
}

#[async_trait]
impl<T: Transport + 'static> ConsumerHandle for MessageConsumer<T> {
    async fn init(&self) -> Result<(), ConsumerError> {
        MessageConsumer::init(self).await
    }

    async fn consume(&self, processor: Arc<dyn MessageProcessor>) -> Result<(), ConsumerError> {
        MessageConsumer::consume(self, processor).await
    }

    async fn destroy(&self) -> Result<(), ConsumerError> {
        MessageConsumer::destroy(self).await
    }

    async fn wait_until_destroyed(&self) {
        MessageConsumer::wait_until_destroyed(self).await
    }

    fn get_statistics(&self) -> HashMap<&'static str, Option<f64>> {
        MessageConsumer::get_statistics(self)
    }

    fn get_average_round_trip_millis(&self) -> Option<f64> {
        MessageConsumer::get_average_round_trip_millis(self)
    }
}

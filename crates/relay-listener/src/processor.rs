use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use relay_consumer::MessageProcessor;
use relay_scheduler::{Scheduler, ServiceExecutionFailure};

use crate::action_map::ActionResourceMap;
use crate::payload::InfoPayload;

/// The pluggable task-emission hook (spec's `scheduleTasks(jsonObject,
/// scheduler)`). Override this when custom logic decides what to schedule;
/// leave [`DefaultScheduleTasks`] in place and register `TaskHandler`s for
/// its action names instead when only `handleTask` needs customizing.
pub trait ScheduleTasks: Send + Sync {
    fn schedule_tasks(&self, payload: &InfoPayload, scheduler: &Scheduler);
}

/// Schedules one collapsible task per resource key derived from the
/// payload (the record key, then each affected entity's key), named by
/// `action_map`'s reverse lookup on the key's resource type.
pub struct DefaultScheduleTasks {
    action_map: ActionResourceMap,
}

impl DefaultScheduleTasks {
    pub fn new(action_map: ActionResourceMap) -> Self {
        Self { action_map }
    }
}

impl ScheduleTasks for DefaultScheduleTasks {
    fn schedule_tasks(&self, payload: &InfoPayload, scheduler: &Scheduler) {
        for key in payload.derive_resource_keys() {
            let Some(action) = self.action_map.action_for_resource_type(key.resource_type()) else {
                warn!(resource_type = key.resource_type(), "no action registered for resource type, skipping");
                continue;
            };
            scheduler
                .create_task_builder(action)
                .parameter("RESOURCE_KEY", key.to_string())
                .resource(key.resource_type().to_string(), key.parts().to_vec())
                .allow_collapse(true)
                .schedule(false);
        }
        scheduler.commit();
    }
}

/// Base `MessageProcessor`: recognizes the INFO payload shape, then hands
/// it to `schedule_tasks`. A body that doesn't match the shape is logged
/// and otherwise ignored — it isn't retryable, so this always returns `Ok`.
pub struct BaseMessageProcessor {
    scheduler: Scheduler,
    schedule_tasks: Arc<dyn ScheduleTasks>,
}

impl BaseMessageProcessor {
    pub fn new(scheduler: Scheduler, action_map: ActionResourceMap) -> Self {
        Self::with_schedule_tasks(scheduler, Arc::new(DefaultScheduleTasks::new(action_map)))
    }

    pub fn with_schedule_tasks(scheduler: Scheduler, schedule_tasks: Arc<dyn ScheduleTasks>) -> Self {
        Self { scheduler, schedule_tasks }
    }
}

#[async_trait]
impl MessageProcessor for BaseMessageProcessor {
    async fn process(&self, payload: &serde_json::Value) -> Result<(), ServiceExecutionFailure> {
        let Some(info) = InfoPayload::parse(payload) else {
            warn!("unrecognized message body, no INFO shape to schedule tasks from");
            return Ok(());
        };
        self.schedule_tasks.schedule_tasks(&info, &self.scheduler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use relay_locking::LockService;
    use relay_scheduler::{FollowUpScheduler, TaskHandler};

    use super::*;

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn handle(
            &self,
            _params: &serde_json::Map<String, serde_json::Value>,
            _multiplicity: usize,
            _follow_up: &FollowUpScheduler,
        ) -> Result<(), ServiceExecutionFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_scheduler() -> Scheduler {
        Scheduler::with_options(
            Arc::new(LockService::new()),
            4,
            0,
            Duration::from_millis(5),
            Arc::new(relay_scheduler::NoopFailureSink),
        )
    }

    #[tokio::test]
    async fn basic_fan_out_schedules_a_record_task_and_one_entity_task_per_affected_entity() {
        let scheduler = fast_scheduler();
        let record_calls = Arc::new(CountingHandler { calls: AtomicUsize::new(0) });
        let entity_calls = Arc::new(CountingHandler { calls: AtomicUsize::new(0) });
        scheduler.register_handler("RECORD", record_calls.clone());
        scheduler.register_handler("AFFECTED_ENTITY", entity_calls.clone());
        scheduler.spawn_dispatcher();

        let processor = BaseMessageProcessor::new(scheduler, ActionResourceMap::default());

        for k in 1..=5 {
            let body = serde_json::json!({
                "MESSAGE_ID": k,
                "DATA_SOURCE": "CUSTOMERS",
                "RECORD_ID": format!("00{k}"),
                "AFFECTED_ENTITIES": [{"ENTITY_ID": k}],
            });
            processor.process(&body).await.expect("recognized INFO payload never fails");
        }

        wait_until(|| record_calls.calls.load(Ordering::SeqCst) == 5 && entity_calls.calls.load(Ordering::SeqCst) == 5).await;
    }

    #[tokio::test]
    async fn an_unrecognized_body_schedules_nothing_and_still_succeeds() {
        let scheduler = fast_scheduler();
        let processor = BaseMessageProcessor::new(scheduler.clone(), ActionResourceMap::default());

        let result = processor.process(&serde_json::json!("this is not json")).await;

        assert!(result.is_ok());
        assert!(scheduler.dump_pending().is_empty());
    }

    struct CustomScheduleTasks {
        calls: Arc<AtomicUsize>,
    }

    impl ScheduleTasks for CustomScheduleTasks {
        fn schedule_tasks(&self, _payload: &InfoPayload, _scheduler: &Scheduler) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn a_custom_schedule_tasks_hook_overrides_the_default_one() {
        let scheduler = fast_scheduler();
        let calls = Arc::new(AtomicUsize::new(0));
        let processor =
            BaseMessageProcessor::with_schedule_tasks(scheduler, Arc::new(CustomScheduleTasks { calls: calls.clone() }));

        processor
            .process(&serde_json::json!({"RECORD_ID": "001"}))
            .await
            .expect("custom hook never fails");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

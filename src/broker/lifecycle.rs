//! Task lifecycle operations.
//!
//! `Broker` moves task messages between the five collections of a
//! [`QueueLayout`]. Each operation is a single store call: either a one-key
//! command or one [`Transition`], so there is never a window where a task is
//! in neither or both of its source and destination.
//!
//! ```text
//!  enqueue ──► pending ──dequeue──► in_progress ──done──► (gone)
//!                ▲  ▲                  │  │  │
//!                │  └─restore_unfinished┘  │  └──kill──► dead
//!                │                         └─retry_later─► retry ─┐
//!  schedule ──► scheduled ──check_and_enqueue──► pending ◄───────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::config::{BrokerConfig, DeadRetention};
use super::layout::{QueueKind, QueueLayout};
use super::message::TaskMessage;
use crate::error::BrokerError;
use crate::metrics::MetricsCollector;
use crate::store::{Placement, RedisStore, Store, Transition};

/// Converts a processing time into a set score (whole Unix seconds).
fn score_of(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64
}

fn time_of(score: f64) -> DateTime<Utc> {
    DateTime::from_timestamp(score as i64, 0).unwrap_or_default()
}

/// Number of entries in each collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_progress: usize,
    pub scheduled: usize,
    pub retry: usize,
    pub dead: usize,
}

impl QueueStats {
    /// Returns the total number of tasks in all collections.
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.scheduled + self.retry + self.dead
    }

    pub fn get(&self, kind: QueueKind) -> usize {
        match kind {
            QueueKind::Pending => self.pending,
            QueueKind::InProgress => self.in_progress,
            QueueKind::Scheduled => self.scheduled,
            QueueKind::Retry => self.retry,
            QueueKind::Dead => self.dead,
        }
    }
}

/// The task lifecycle engine.
///
/// Holds no mutable state beyond the injected store handle; any number of
/// brokers, in any number of processes, may share one store.
#[derive(Clone)]
pub struct Broker {
    store: Arc<dyn Store>,
    layout: QueueLayout,
    dead_retention: DeadRetention,
    metrics: MetricsCollector,
}

impl Broker {
    /// Creates a broker over `store` using the layout and retention from `config`.
    pub fn new(store: Arc<dyn Store>, config: &BrokerConfig) -> Self {
        Self::with_layout(store, config.layout(), config.dead_retention)
    }

    pub fn with_layout(
        store: Arc<dyn Store>,
        layout: QueueLayout,
        dead_retention: DeadRetention,
    ) -> Self {
        Self {
            store,
            layout,
            dead_retention,
            metrics: MetricsCollector::new(),
        }
    }

    /// Connects to the Redis instance named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Store` if the connection fails.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let store = RedisStore::connect(&config.redis_url).await?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn layout(&self) -> &QueueLayout {
        &self.layout
    }

    pub fn dead_retention(&self) -> DeadRetention {
        self.dead_retention
    }

    fn key(&self, kind: QueueKind) -> &str {
        self.layout.key(kind)
    }

    fn record<T>(&self, operation: &str, result: &Result<T, BrokerError>) {
        self.metrics.record_operation(operation, result.is_ok());
    }

    /// Appends `task` to the tail of pending.
    pub async fn enqueue(&self, task: &TaskMessage) -> Result<(), BrokerError> {
        let result = self.enqueue_inner(task).await;
        self.record("enqueue", &result);
        result
    }

    async fn enqueue_inner(&self, task: &TaskMessage) -> Result<(), BrokerError> {
        let encoded = task.encode()?;
        self.store.push(self.key(QueueKind::Pending), &encoded).await?;
        debug!(task_id = %task.id, task_type = %task.kind, "Enqueued task");
        Ok(())
    }

    /// Adds `task` to the scheduled set, due at `process_at`.
    pub async fn schedule(
        &self,
        task: &TaskMessage,
        process_at: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        let result = self.schedule_inner(task, process_at).await;
        self.record("schedule", &result);
        result
    }

    async fn schedule_inner(
        &self,
        task: &TaskMessage,
        process_at: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        let encoded = task.encode()?;
        self.store
            .add_scored(self.key(QueueKind::Scheduled), &encoded, score_of(process_at))
            .await?;
        debug!(
            task_id = %task.id,
            task_type = %task.kind,
            process_at = %process_at,
            "Scheduled task"
        );
        Ok(())
    }

    /// Claims the head of pending, moving it to in-progress in the same
    /// atomic step, and waits up to `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// - `BrokerError::DequeueTimeout` if pending stayed empty for `timeout`
    /// - `BrokerError::Serialization` if the claimed record cannot be decoded;
    ///   the record stays in in-progress
    pub async fn dequeue(&self, timeout: Duration) -> Result<TaskMessage, BrokerError> {
        let result = self.dequeue_inner(timeout).await;
        match &result {
            Err(BrokerError::DequeueTimeout(_)) => self.metrics.record_dequeue_timeout(),
            other => self.record("dequeue", other),
        }
        result
    }

    async fn dequeue_inner(&self, timeout: Duration) -> Result<TaskMessage, BrokerError> {
        let claimed = self
            .store
            .blocking_move(
                self.key(QueueKind::Pending),
                self.key(QueueKind::InProgress),
                timeout,
            )
            .await?;

        let Some(data) = claimed else {
            trace!(timeout = ?timeout, "Dequeue timed out");
            return Err(BrokerError::DequeueTimeout(timeout));
        };

        let task = TaskMessage::decode(&data)?;
        debug!(task_id = %task.id, task_type = %task.kind, "Dequeued task");
        Ok(task)
    }

    /// Removes `task` from in-progress. Absent tasks are not an error.
    pub async fn done(&self, task: &TaskMessage) -> Result<(), BrokerError> {
        let result = self.finish(task, Placement::Discard, "done").await;
        self.record("done", &result);
        result
    }

    /// Moves `task` from in-progress to the retry set, due at `process_at`.
    pub async fn retry_later(
        &self,
        task: &TaskMessage,
        process_at: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        let placement = Placement::Scored {
            set: self.key(QueueKind::Retry),
            score: score_of(process_at),
            trim: None,
        };
        let result = self.finish(task, placement, "retry_later").await;
        self.record("retry_later", &result);
        result
    }

    /// Moves `task` from in-progress to the dead set, scored at the current
    /// time, and applies the dead retention policy.
    pub async fn kill(&self, task: &TaskMessage) -> Result<(), BrokerError> {
        let now = Utc::now();
        let placement = Placement::Scored {
            set: self.key(QueueKind::Dead),
            score: score_of(now),
            trim: self.dead_retention.trim_at(now),
        };
        let result = self.finish(task, placement, "kill").await;
        self.record("kill", &result);
        result
    }

    async fn finish(
        &self,
        task: &TaskMessage,
        to: Placement<'_>,
        operation: &str,
    ) -> Result<(), BrokerError> {
        let encoded = task.encode()?;
        let removed = self
            .store
            .transition(&Transition::Member {
                from: self.key(QueueKind::InProgress),
                member: &encoded,
                to,
            })
            .await?;

        if removed == 0 {
            warn!(
                task_id = %task.id,
                task_type = %task.kind,
                operation = operation,
                "Task was not in progress"
            );
        } else {
            debug!(
                task_id = %task.id,
                task_type = %task.kind,
                operation = operation,
                "Finished task"
            );
        }
        Ok(())
    }

    /// Moves every in-progress task back to pending.
    ///
    /// Meant to run once when a host starts, to reclaim tasks claimed by a
    /// process that died before finishing them.
    ///
    /// # Returns
    ///
    /// The number of tasks restored.
    pub async fn restore_unfinished(&self) -> Result<usize, BrokerError> {
        let result = self
            .store
            .transition(&Transition::Drain {
                from: self.key(QueueKind::InProgress),
                to: self.key(QueueKind::Pending),
            })
            .await
            .map_err(BrokerError::from);
        self.record("restore_unfinished", &result);

        let restored = result?;
        self.metrics.record_restored(restored);
        if restored > 0 {
            info!(count = restored, "Restored unfinished tasks to pending");
        }
        Ok(restored as usize)
    }

    /// Promotes every scheduled and retry entry that is due into pending.
    ///
    /// Safe to run concurrently from several processes: each due entry is
    /// promoted by exactly one of them.
    ///
    /// # Returns
    ///
    /// The number of tasks promoted across both sets.
    pub async fn check_and_enqueue(&self) -> Result<usize, BrokerError> {
        let result = self.check_and_enqueue_inner().await;
        self.record("check_and_enqueue", &result);
        result
    }

    async fn check_and_enqueue_inner(&self) -> Result<usize, BrokerError> {
        let now = score_of(Utc::now());
        let mut total = 0;

        for source in [QueueKind::Scheduled, QueueKind::Retry] {
            let promoted = self
                .store
                .transition(&Transition::Due {
                    from: self.key(source),
                    max_score: now,
                    to: self.key(QueueKind::Pending),
                })
                .await?;

            self.metrics.record_promoted(source.as_str(), promoted);
            if promoted > 0 {
                info!(source = %source, count = promoted, "Promoted due tasks to pending");
            }
            total += promoted as usize;
        }

        Ok(total)
    }

    /// Returns the size of every collection.
    pub async fn stats(&self) -> Result<QueueStats, BrokerError> {
        let (pending, in_progress, scheduled, retry, dead) = tokio::try_join!(
            self.store.list_len(self.key(QueueKind::Pending)),
            self.store.list_len(self.key(QueueKind::InProgress)),
            self.store.scored_len(self.key(QueueKind::Scheduled)),
            self.store.scored_len(self.key(QueueKind::Retry)),
            self.store.scored_len(self.key(QueueKind::Dead)),
        )?;

        let stats = QueueStats {
            pending,
            in_progress,
            scheduled,
            retry,
            dead,
        };
        for kind in QueueKind::ALL {
            self.metrics.update_queue_depth(kind.as_str(), stats.get(kind));
        }
        Ok(stats)
    }

    /// Returns the tasks in a collection.
    ///
    /// Lists are returned left to right (newest pending first); sorted sets
    /// in ascending score order.
    pub async fn list(&self, kind: QueueKind) -> Result<Vec<TaskMessage>, BrokerError> {
        let raw: Vec<String> = if kind.is_scored() {
            self.store
                .scored_range(self.key(kind))
                .await?
                .into_iter()
                .map(|(member, _)| member)
                .collect()
        } else {
            self.store.list_range(self.key(kind)).await?
        };

        raw.iter().map(|data| TaskMessage::decode(data)).collect()
    }

    /// Returns the tasks in a sorted set with the time each is scored at.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::NotScored` for pending and in-progress.
    pub async fn list_scored(
        &self,
        kind: QueueKind,
    ) -> Result<Vec<(TaskMessage, DateTime<Utc>)>, BrokerError> {
        if !kind.is_scored() {
            return Err(BrokerError::NotScored(kind.as_str().to_string()));
        }

        self.store
            .scored_range(self.key(kind))
            .await?
            .iter()
            .map(|(data, score)| Ok((TaskMessage::decode(data)?, time_of(*score))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn setup() -> (Arc<MemoryStore>, Broker) {
        let store = Arc::new(MemoryStore::new());
        let broker = Broker::new(store.clone(), &BrokerConfig::default());
        (store, broker)
    }

    fn task(kind: &str) -> TaskMessage {
        TaskMessage::new(kind, None)
    }

    fn sorted(mut tasks: Vec<TaskMessage>) -> Vec<TaskMessage> {
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    async fn seed_list(store: &MemoryStore, key: &str, tasks: &[&TaskMessage]) {
        for t in tasks {
            store.push(key, &t.encode().unwrap()).await.unwrap();
        }
    }

    async fn seed_scored(store: &MemoryStore, key: &str, entries: &[(&TaskMessage, DateTime<Utc>)]) {
        for (t, at) in entries {
            store
                .add_scored(key, &t.encode().unwrap(), score_of(*at))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_enqueue_persists_exact_message() {
        let cases = vec![
            TaskMessage::from_json(
                "send_email",
                json!({"to": "exampleuser@gmail.com", "from": "noreply@example.com"}),
            ),
            TaskMessage::from_json("generate_csv", json!({})),
            task("sync"),
        ];

        for msg in cases {
            let (_, broker) = setup();
            broker.enqueue(&msg).await.unwrap();

            let pending = broker.list(QueueKind::Pending).await.unwrap();
            assert_eq!(pending, vec![msg]);
        }
    }

    #[tokio::test]
    async fn test_dequeue_moves_head_to_in_progress() {
        let (_, broker) = setup();
        let t1 = TaskMessage::from_json("send_email", json!({"subject": "hello!"}));
        broker.enqueue(&t1).await.unwrap();

        let got = broker.dequeue(Duration::from_millis(100)).await.unwrap();

        assert_eq!(got, t1);
        let stats = broker.stats().await.unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.in_progress, 1);
    }

    #[tokio::test]
    async fn test_dequeue_timeout_leaves_state_unchanged() {
        let (_, broker) = setup();

        let err = broker.dequeue(Duration::from_millis(50)).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(broker.stats().await.unwrap(), QueueStats::default());
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo() {
        let (_, broker) = setup();
        let tasks: Vec<TaskMessage> = (0..5).map(|i| task(&format!("task_{}", i))).collect();
        for t in &tasks {
            broker.enqueue(t).await.unwrap();
        }

        for expected in &tasks {
            let got = broker.dequeue(Duration::from_millis(50)).await.unwrap();
            assert_eq!(&got, expected);
        }
    }

    #[tokio::test]
    async fn test_dequeue_undecodable_record_stays_in_progress() {
        let (store, broker) = setup();
        store
            .push(broker.layout().key(QueueKind::Pending), "garbage")
            .await
            .unwrap();

        let err = broker.dequeue(Duration::from_millis(50)).await.unwrap_err();

        assert!(matches!(err, BrokerError::Serialization(_)));
        assert_eq!(
            store
                .list_range(broker.layout().key(QueueKind::InProgress))
                .await
                .unwrap(),
            vec!["garbage"]
        );
    }

    #[tokio::test]
    async fn test_done() {
        let t1 = task("send_email");
        let t2 = task("export_csv");

        let cases: Vec<(Vec<&TaskMessage>, &TaskMessage, Vec<TaskMessage>)> = vec![
            (vec![&t1, &t2], &t1, vec![t2.clone()]),
            (vec![&t2], &t1, vec![t2.clone()]),
            (vec![&t1], &t1, vec![]),
        ];

        for (in_progress, target, want) in cases {
            let (store, broker) = setup();
            seed_list(&store, broker.layout().key(QueueKind::InProgress), &in_progress).await;

            broker.done(target).await.unwrap();

            let got = broker.list(QueueKind::InProgress).await.unwrap();
            assert_eq!(sorted(got), sorted(want));
        }
    }

    #[tokio::test]
    async fn test_done_does_not_alias_identical_content() {
        let (store, broker) = setup();
        let a = task("send_email");
        let b = task("send_email");
        seed_list(&store, broker.layout().key(QueueKind::InProgress), &[&a, &b]).await;

        broker.done(&a).await.unwrap();

        assert_eq!(broker.list(QueueKind::InProgress).await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn test_done_after_dequeue_with_float_payload() {
        let (_, broker) = setup();
        let msg = TaskMessage::from_json(
            "resample",
            json!({"x": 1.0715660391465826e-75, "ratio": 0.1, "tiny": 5e-324}),
        );
        broker.enqueue(&msg).await.unwrap();

        let got = broker.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(got, msg);
        assert_eq!(got.encode().unwrap(), msg.encode().unwrap());

        broker.done(&got).await.unwrap();

        assert_eq!(broker.stats().await.unwrap().in_progress, 0);
    }

    #[tokio::test]
    async fn test_kill_keeps_killed_task_with_zero_max_len() {
        let store = Arc::new(MemoryStore::new());
        let retention = DeadRetention::default().with_max_len(0);
        let broker = Broker::with_layout(store.clone(), QueueLayout::default(), retention);
        let t1 = task("send_email");
        seed_list(&store, broker.layout().key(QueueKind::InProgress), &[&t1]).await;

        broker.kill(&t1).await.unwrap();

        assert_eq!(broker.list(QueueKind::Dead).await.unwrap(), vec![t1]);
    }

    #[tokio::test]
    async fn test_kill_into_empty_dead_set() {
        let (store, broker) = setup();
        let t1 = task("send_email");
        seed_list(&store, broker.layout().key(QueueKind::InProgress), &[&t1]).await;

        let before = Utc::now().timestamp();
        broker.kill(&t1).await.unwrap();
        let after = Utc::now().timestamp();

        let dead = broker.list_scored(QueueKind::Dead).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].0, t1);
        assert!(dead[0].1.timestamp() >= before && dead[0].1.timestamp() <= after);
        assert_eq!(broker.stats().await.unwrap().in_progress, 0);
    }

    #[tokio::test]
    async fn test_kill_trims_dead_set_by_age_and_length() {
        let store = Arc::new(MemoryStore::new());
        let retention = DeadRetention::default()
            .with_max_age(Duration::from_secs(24 * 3600))
            .with_max_len(2);
        let broker = Broker::with_layout(store.clone(), QueueLayout::default(), retention);
        let now = Utc::now();

        let ancient = task("ancient");
        let older = task("older");
        let recent = task("recent");
        seed_scored(
            &store,
            broker.layout().key(QueueKind::Dead),
            &[
                (&ancient, now - ChronoDuration::days(30)),
                (&older, now - ChronoDuration::hours(2)),
                (&recent, now - ChronoDuration::hours(1)),
            ],
        )
        .await;

        let victim = task("victim");
        broker.kill(&victim).await.unwrap();

        let dead: Vec<TaskMessage> = broker.list(QueueKind::Dead).await.unwrap();
        assert_eq!(dead, vec![recent, victim]);
    }

    #[tokio::test]
    async fn test_retry_later_moves_with_exact_score() {
        let (store, broker) = setup();
        let msg = TaskMessage::from_json("send_email", json!({"subject": "hello"}));
        seed_list(&store, broker.layout().key(QueueKind::InProgress), &[&msg]).await;
        let process_at = Utc::now() + ChronoDuration::minutes(15);

        broker.retry_later(&msg, process_at).await.unwrap();

        let retry = store
            .scored_range(broker.layout().key(QueueKind::Retry))
            .await
            .unwrap();
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].1, process_at.timestamp() as f64);
        assert_eq!(TaskMessage::decode(&retry[0].0).unwrap(), msg);
        assert_eq!(broker.stats().await.unwrap().in_progress, 0);
    }

    #[tokio::test]
    async fn test_retry_later_store_failure_keeps_task_in_progress() {
        let (store, broker) = setup();
        let msg = task("flaky");
        seed_list(&store, broker.layout().key(QueueKind::InProgress), &[&msg]).await;

        store.set_unavailable(true);
        let err = broker
            .retry_later(&msg, Utc::now() + ChronoDuration::minutes(1))
            .await
            .unwrap_err();
        store.set_unavailable(false);

        assert!(matches!(err, BrokerError::Store(_)));
        assert_eq!(broker.list(QueueKind::InProgress).await.unwrap(), vec![msg]);
        assert_eq!(broker.stats().await.unwrap().retry, 0);
    }

    #[tokio::test]
    async fn test_schedule_with_exact_score() {
        let (store, broker) = setup();
        let msg = TaskMessage::from_json("send_email", json!({"subject": "hello"}));
        let process_at = Utc::now() + ChronoDuration::minutes(15);

        broker.schedule(&msg, process_at).await.unwrap();

        let scheduled = store
            .scored_range(broker.layout().key(QueueKind::Scheduled))
            .await
            .unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].1, process_at.timestamp() as f64);
        assert_eq!(broker.stats().await.unwrap().pending, 0);

        let listed = broker.list_scored(QueueKind::Scheduled).await.unwrap();
        assert_eq!(listed[0].0, msg);
        assert_eq!(listed[0].1.timestamp(), process_at.timestamp());
    }

    #[tokio::test]
    async fn test_restore_unfinished() {
        let t1 = task("send_email");
        let t2 = task("export_csv");
        let t3 = task("sync_stuff");

        let cases: Vec<(Vec<&TaskMessage>, Vec<&TaskMessage>, usize)> = vec![
            (vec![&t1, &t2, &t3], vec![], 3),
            (vec![], vec![&t1, &t2, &t3], 0),
            (vec![&t2, &t3], vec![&t1], 2),
        ];

        for (in_progress, pending, want_restored) in cases {
            let (store, broker) = setup();
            seed_list(&store, broker.layout().key(QueueKind::InProgress), &in_progress).await;
            seed_list(&store, broker.layout().key(QueueKind::Pending), &pending).await;

            let restored = broker.restore_unfinished().await.unwrap();

            assert_eq!(restored, want_restored);
            assert!(broker.list(QueueKind::InProgress).await.unwrap().is_empty());
            assert_eq!(
                sorted(broker.list(QueueKind::Pending).await.unwrap()),
                sorted(vec![t1.clone(), t2.clone(), t3.clone()])
            );
        }
    }

    #[tokio::test]
    async fn test_check_and_enqueue() {
        let t1 = task("send_email");
        let t2 = task("generate_csv");
        let t3 = task("gen_thumbnail");
        let second_ago = Utc::now() - ChronoDuration::seconds(1);
        let hour_from_now = Utc::now() + ChronoDuration::hours(1);

        type Case<'a> = (
            Vec<(&'a TaskMessage, DateTime<Utc>)>,
            Vec<(&'a TaskMessage, DateTime<Utc>)>,
            Vec<TaskMessage>,
            Vec<TaskMessage>,
            Vec<TaskMessage>,
        );
        let cases: Vec<Case> = vec![
            (
                vec![(&t1, second_ago), (&t2, second_ago)],
                vec![(&t3, second_ago)],
                vec![t1.clone(), t2.clone(), t3.clone()],
                vec![],
                vec![],
            ),
            (
                vec![(&t1, hour_from_now), (&t2, second_ago)],
                vec![(&t3, second_ago)],
                vec![t2.clone(), t3.clone()],
                vec![t1.clone()],
                vec![],
            ),
            (
                vec![(&t1, hour_from_now), (&t2, hour_from_now)],
                vec![(&t3, hour_from_now)],
                vec![],
                vec![t1.clone(), t2.clone()],
                vec![t3.clone()],
            ),
        ];

        for (scheduled, retry, want_pending, want_scheduled, want_retry) in cases {
            let (store, broker) = setup();
            seed_scored(&store, broker.layout().key(QueueKind::Scheduled), &scheduled).await;
            seed_scored(&store, broker.layout().key(QueueKind::Retry), &retry).await;

            let promoted = broker.check_and_enqueue().await.unwrap();

            assert_eq!(promoted, want_pending.len());
            assert_eq!(
                sorted(broker.list(QueueKind::Pending).await.unwrap()),
                sorted(want_pending)
            );
            assert_eq!(
                sorted(broker.list(QueueKind::Scheduled).await.unwrap()),
                sorted(want_scheduled)
            );
            assert_eq!(
                sorted(broker.list(QueueKind::Retry).await.unwrap()),
                sorted(want_retry)
            );
        }
    }

    #[tokio::test]
    async fn test_check_and_enqueue_twice_does_not_duplicate() {
        let (store, broker) = setup();
        let t1 = task("send_email");
        seed_scored(
            &store,
            broker.layout().key(QueueKind::Scheduled),
            &[(&t1, Utc::now() - ChronoDuration::seconds(1))],
        )
        .await;

        assert_eq!(broker.check_and_enqueue().await.unwrap(), 1);
        assert_eq!(broker.check_and_enqueue().await.unwrap(), 0);
        assert_eq!(broker.list(QueueKind::Pending).await.unwrap(), vec![t1]);
    }

    #[tokio::test]
    async fn test_store_failures_surface_as_store_errors() {
        let (store, broker) = setup();
        store.set_unavailable(true);
        let t = task("any");

        assert!(matches!(broker.enqueue(&t).await, Err(BrokerError::Store(_))));
        assert!(matches!(
            broker.dequeue(Duration::from_millis(10)).await,
            Err(BrokerError::Store(_))
        ));
        assert!(matches!(broker.done(&t).await, Err(BrokerError::Store(_))));
        assert!(matches!(broker.kill(&t).await, Err(BrokerError::Store(_))));
        assert!(matches!(
            broker.restore_unfinished().await,
            Err(BrokerError::Store(_))
        ));
        assert!(matches!(
            broker.check_and_enqueue().await,
            Err(BrokerError::Store(_))
        ));
        assert!(matches!(broker.stats().await, Err(BrokerError::Store(_))));
    }

    #[tokio::test]
    async fn test_list_scored_rejects_lists() {
        let (_, broker) = setup();
        let err = broker.list_scored(QueueKind::Pending).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotScored(_)));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = Arc::new(MemoryStore::new());
        let a = Broker::new(store.clone(), &BrokerConfig::default().with_namespace("a"));
        let b = Broker::new(store.clone(), &BrokerConfig::default().with_namespace("b"));

        a.enqueue(&task("only_in_a")).await.unwrap();

        assert_eq!(a.stats().await.unwrap().pending, 1);
        assert_eq!(b.stats().await.unwrap().pending, 0);
    }

    #[test]
    fn test_queue_stats_total() {
        let stats = QueueStats {
            pending: 10,
            in_progress: 5,
            scheduled: 3,
            retry: 2,
            dead: 1,
        };

        assert_eq!(stats.total(), 21);
        assert_eq!(stats.get(QueueKind::Retry), 2);
    }
}

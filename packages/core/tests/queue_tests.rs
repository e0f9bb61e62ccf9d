use chrono::{DateTime, Duration, Utc};
use jobq_core::{
    FailureOutcome, Job, JobId, JobOptions, JobState, Priority, Queue, QueueError, QueueOptions,
    QueueState,
};
use serde_json::json;
use std::error::Error;

fn options(concurrency: usize) -> QueueOptions {
    QueueOptions::default()
        .with_concurrency(concurrency)
        .with_retry_attempts(3)
        .with_retry_delay_ms(10)
}

fn add(queue: &mut Queue, priority: Priority) -> Result<JobId, QueueError> {
    let job = JobOptions::new()
        .with_priority(priority)
        .build_job(queue.name(), json!({ "n": queue.stats().total }), queue.options())?;
    let id = job.id;
    queue.admit(job)?;
    Ok(id)
}

#[test]
fn state_machine_only_allows_documented_transitions() {
    use JobState::*;

    assert!(Pending.can_transition_to(Processing));
    assert!(Pending.can_transition_to(Cancelled));
    assert!(Processing.can_transition_to(Completed));
    assert!(Processing.can_transition_to(Failed));
    assert!(Processing.can_transition_to(Retry));
    assert!(Retry.can_transition_to(Pending));

    assert!(!Processing.can_transition_to(Cancelled));
    assert!(!Retry.can_transition_to(Cancelled));
    for terminal in [Completed, Failed, Cancelled] {
        assert!(terminal.is_terminal());
        for next in [Pending, Processing, Completed, Failed, Retry, Cancelled] {
            assert!(!terminal.can_transition_to(next));
        }
    }

    let mut job = Job::new("email", json!({}));
    let err = job.transition(Completed);
    assert!(matches!(
        err,
        Err(QueueError::InvalidStateTransition {
            from: Pending,
            to: Completed,
            ..
        })
    ));
    assert_eq!(job.state, Pending);
}

#[test]
fn job_options_fall_back_to_queue_defaults() -> Result<(), Box<dyn Error>> {
    let defaults = QueueOptions::default()
        .with_retry_attempts(5)
        .with_timeout_ms(250);

    let job = JobOptions::new().build_job("export", json!({ "format": "csv" }), &defaults)?;
    assert_eq!(job.attempts.max, 5);
    assert_eq!(job.attempts.current, 0);
    assert_eq!(job.timeout_ms, 250);
    assert_eq!(job.priority, Priority::Normal);
    assert_eq!(job.state, JobState::Pending);

    let job = JobOptions::new()
        .with_attempts(1)
        .with_timeout_ms(10)
        .with_priority(Priority::High)
        .build_job("export", json!(null), &defaults)?;
    assert_eq!(job.attempts.max, 1);
    assert_eq!(job.timeout_ms, 10);
    assert_eq!(job.priority, Priority::High);

    let zero = JobOptions::new()
        .with_attempts(0)
        .build_job("export", json!(null), &defaults);
    assert!(matches!(zero, Err(QueueError::InvalidOptions(_))));
    Ok(())
}

#[test]
fn admission_orders_by_priority_then_insertion() -> Result<(), Box<dyn Error>> {
    let mut queue = Queue::new("email", options(1));

    let low = add(&mut queue, Priority::Low)?;
    let normal_a = add(&mut queue, Priority::Normal)?;
    let high = add(&mut queue, Priority::High)?;
    let normal_b = add(&mut queue, Priority::Normal)?;
    let urgent = add(&mut queue, Priority::Urgent)?;

    assert_eq!(
        queue.pending_ids(),
        vec![urgent, high, normal_a, normal_b, low]
    );
    assert_eq!(queue.stats().pending, 5);
    assert_eq!(queue.stats().total, 5);
    Ok(())
}

#[test]
fn dispatch_respects_concurrency_and_priority() -> Result<(), Box<dyn Error>> {
    let mut queue = Queue::new("email", options(2));
    let first = add(&mut queue, Priority::Normal)?;
    let second = add(&mut queue, Priority::Normal)?;
    let third = add(&mut queue, Priority::Normal)?;
    let urgent = add(&mut queue, Priority::Urgent)?;

    let started = queue.dispatch(Utc::now(), usize::MAX);
    let ids: Vec<JobId> = started.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![urgent, first]);
    assert!(started.iter().all(|j| j.state == JobState::Processing));
    assert!(started.iter().all(|j| j.attempts.current == 1));
    assert!(started.iter().all(|j| j.started_at.is_some()));
    assert_eq!(queue.processing_len(), 2);
    assert_eq!(queue.capacity(), 0);

    // Full: nothing more goes out until a slot frees up.
    assert!(queue.dispatch(Utc::now(), usize::MAX).is_empty());

    queue.complete(urgent, json!({ "sent": true }), Utc::now())?;
    let next = queue.dispatch(Utc::now(), usize::MAX);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].id, second);
    assert_eq!(queue.pending_ids(), vec![third]);
    assert!(queue.processing_len() <= queue.options().concurrency);
    Ok(())
}

#[test]
fn dispatch_limit_caps_a_single_scan() -> Result<(), Box<dyn Error>> {
    let mut queue = Queue::new("images", options(4));
    for _ in 0..4 {
        add(&mut queue, Priority::Normal)?;
    }
    assert_eq!(queue.dispatch(Utc::now(), 1).len(), 1);
    assert_eq!(queue.stats().processing, 1);
    assert_eq!(queue.stats().pending, 3);
    Ok(())
}

#[test]
fn delayed_jobs_are_skipped_until_eligible() -> Result<(), Box<dyn Error>> {
    let mut queue = Queue::new("email", options(2));
    let delayed = JobOptions::new()
        .with_delay_ms(60_000)
        .build_job("email", json!({}), queue.options())?;
    let delayed_id = delayed.id;
    let available_at = delayed.available_at();
    queue.admit(delayed)?;
    let ready = add(&mut queue, Priority::Low)?;

    let started = queue.dispatch(Utc::now(), usize::MAX);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].id, ready);
    assert_eq!(queue.pending_ids(), vec![delayed_id]);

    let later = queue.dispatch(available_at + Duration::milliseconds(1), usize::MAX);
    assert_eq!(later.len(), 1);
    assert_eq!(later[0].id, delayed_id);
    Ok(())
}

#[test]
fn out_of_range_delays_stay_pending() -> Result<(), Box<dyn Error>> {
    let mut queue = Queue::new("export", options(2));
    let forever = JobOptions::new()
        .with_delay_ms(u64::MAX)
        .build_job("export", json!({}), queue.options())?;
    let forever_id = forever.id;
    assert_eq!(forever.available_at(), DateTime::<Utc>::MAX_UTC);
    queue.admit(forever)?;
    let ready = add(&mut queue, Priority::Normal)?;

    let started = queue.dispatch(Utc::now(), usize::MAX);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].id, ready);
    assert_eq!(queue.pending_ids(), vec![forever_id]);

    // Overflows the date range when added to the creation time.
    let huge = JobOptions::new()
        .with_delay_ms(i64::MAX as u64)
        .build_job("export", json!({}), queue.options())?;
    assert!(!huge.is_eligible(Utc::now()));
    Ok(())
}

#[test]
fn failing_attempts_retry_then_fail() -> Result<(), Box<dyn Error>> {
    let mut queue = Queue::new("email", options(1).with_retry_attempts(2));
    let id = add(&mut queue, Priority::Normal)?;
    let boom = QueueError::Processor("smtp unavailable".into());
    assert!(boom.is_execution_error());
    assert!(!QueueError::QueueFull("email".into()).is_execution_error());

    queue.dispatch(Utc::now(), usize::MAX);
    match queue.fail(id, &boom, Utc::now())? {
        FailureOutcome::Retry { job, delay_ms } => {
            assert_eq!(job.state, JobState::Retry);
            assert_eq!(delay_ms, 10);
            assert_eq!(job.attempts.current, 1);
        }
        other => panic!("expected retry, got {:?}", other),
    }
    assert!(queue.is_drained());
    assert_eq!(queue.stats().retried, 1);
    // Waiting out the delay: neither pending nor processing.
    assert!(queue.pending_ids().is_empty());

    queue.requeue(id)?;
    queue.dispatch(Utc::now(), usize::MAX);
    match queue.fail(id, &QueueError::Timeout(50), Utc::now())? {
        FailureOutcome::Failed(job) => {
            assert_eq!(job.state, JobState::Failed);
            assert_eq!(job.attempts.current, 2);
            assert_eq!(job.attempts.current, job.attempts.max);
            assert_eq!(job.error.as_deref(), Some("Job timed out after 50ms"));
            assert!(job.completed_at.is_some());
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(queue.stats().failed, 1);
    assert!(queue.is_drained());
    Ok(())
}

#[test]
fn retried_jobs_requeue_at_the_tail() -> Result<(), Box<dyn Error>> {
    let mut queue = Queue::new("email", options(1));
    let urgent = add(&mut queue, Priority::Urgent)?;
    queue.dispatch(Utc::now(), usize::MAX);

    let low = add(&mut queue, Priority::Low)?;
    queue.fail(urgent, &QueueError::Processor("x".into()), Utc::now())?;
    queue.requeue(urgent)?;

    assert_eq!(queue.pending_ids(), vec![low, urgent]);
    Ok(())
}

#[test]
fn cancel_only_applies_to_pending_jobs() -> Result<(), Box<dyn Error>> {
    let mut queue = Queue::new("export", options(1));
    let running = add(&mut queue, Priority::Normal)?;
    let waiting = add(&mut queue, Priority::Normal)?;
    queue.dispatch(Utc::now(), usize::MAX);

    let cancelled = queue.cancel(waiting, Utc::now())?;
    assert_eq!(cancelled.state, JobState::Cancelled);
    assert!(cancelled.completed_at.is_some());
    assert!(queue.pending_ids().is_empty());
    assert_eq!(queue.stats().cancelled, 1);

    let err = queue.cancel(running, Utc::now());
    assert!(matches!(
        err,
        Err(QueueError::InvalidStateTransition {
            from: JobState::Processing,
            to: JobState::Cancelled,
            ..
        })
    ));
    assert!(queue.is_processing(running));

    let missing = JobId::new();
    assert_eq!(
        queue.cancel(missing, Utc::now()),
        Err(QueueError::JobNotFound(missing))
    );
    Ok(())
}

#[test]
fn full_and_paused_queues() -> Result<(), Box<dyn Error>> {
    let mut queue = Queue::new("images", options(1).with_max_queue_size(1));
    add(&mut queue, Priority::Normal)?;
    assert_eq!(
        add(&mut queue, Priority::Normal),
        Err(QueueError::QueueFull("images".into()))
    );

    assert_eq!(queue.set_state(QueueState::Paused), QueueState::Running);
    assert!(queue.dispatch(Utc::now(), usize::MAX).is_empty());
    queue.set_state(QueueState::Running);
    assert_eq!(queue.dispatch(Utc::now(), usize::MAX).len(), 1);
    Ok(())
}

#[test]
fn stats_helpers() {
    let mut queue = Queue::new("email", options(1));
    assert_eq!(queue.stats().success_rate(), None);
    assert!(queue.options().validate().is_ok());
    assert!(QueueOptions::default().with_concurrency(0).validate().is_err());

    let info = queue.info();
    assert_eq!(info.name, "email");
    assert_eq!(info.state, QueueState::Running);
    assert!(queue.jobs(None, 10).is_empty());
    queue.set_state(QueueState::Paused);
    assert_eq!(queue.info().state, QueueState::Paused);
}

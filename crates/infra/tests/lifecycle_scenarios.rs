//! End-to-end lifecycle scenarios over the in-memory store.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use stint_core::{Fault, JobStatus, PERSISTENCE_FAILURE};
use stint_infra::lifecycle::{JobContext, LifecycleConfig, LifecycleSettings};
use stint_infra::workers::FailFastGateway;
use stint_infra::{InMemoryRecordStore, RecordStore};

use common::{boom, created, setup, stored_status, CountingGateway, Import};

#[test]
fn successful_run_reports_full_progress() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_clone = observed.clone();
    let (lc, store) = setup(
        LifecycleConfig::builder(move |_: &mut Import, ctx: &JobContext<'_, Import>| {
            ctx.increment_progress()?;
            ctx.increment_progress()?;
            observed_clone.lock().unwrap().push(ctx.progress()?);
            Ok(())
        })
        .total_count(|import: &Import| Ok(import.rows))
        .build(),
    );
    let mut import = created(&lc, 4);

    lc.process(&mut import, false).unwrap();

    assert_eq!(*observed.lock().unwrap(), vec![50]);
    assert_eq!(import.job.status(), JobStatus::Completed);
    assert_eq!(stored_status(&store, import.id), JobStatus::Completed);
    assert_eq!(lc.progress(&import).unwrap(), 100);
    assert_eq!(store.meter_count(), 0);
    assert!(import.job.error_detail().is_empty());
}

#[test]
fn progress_is_read_from_the_live_meter() {
    let halfway = Arc::new(Barrier::new(2));
    let resume = Arc::new(Barrier::new(2));
    let (work_halfway, work_resume) = (halfway.clone(), resume.clone());
    let (lc, _store) = setup(
        LifecycleConfig::builder(move |_: &mut Import, ctx: &JobContext<'_, Import>| {
            ctx.increment_progress_by(2)?;
            work_halfway.wait();
            work_resume.wait();
            Ok(())
        })
        .total_count(|import: &Import| Ok(import.rows))
        .build(),
    );
    let import = created(&lc, 4);
    let observer = import.clone();

    let runner = {
        let lc = lc.clone();
        let mut import = import;
        thread::spawn(move || lc.process(&mut import, false))
    };

    halfway.wait();
    let mid_run = lc.progress(&observer).unwrap();
    resume.wait();
    runner.join().unwrap().unwrap();

    assert_eq!(mid_run, 50);
    let mut observer = observer;
    lc.reload(&mut observer).unwrap();
    assert_eq!(lc.progress(&observer).unwrap(), 100);
}

#[test]
fn non_positive_total_count_is_coerced_to_one() {
    let totals = Arc::new(Mutex::new(Vec::new()));
    let totals_clone = totals.clone();
    let (lc, _store) = setup(
        LifecycleConfig::builder(move |import: &mut Import, _: &JobContext<'_, Import>| {
            let total = import.job.progress_meter().map(|m| m.total_count());
            totals_clone.lock().unwrap().push(total);
            Ok(())
        })
        .total_count(|import: &Import| Ok(import.rows))
        .build(),
    );

    let mut empty = created(&lc, 0);
    let mut negative = created(&lc, -3);
    lc.process(&mut empty, false).unwrap();
    lc.process(&mut negative, false).unwrap();

    assert_eq!(*totals.lock().unwrap(), vec![Some(1), Some(1)]);
}

#[test]
fn runtime_error_is_recorded_and_reraised() {
    let (lc, store) = setup(
        LifecycleConfig::builder(|_: &mut Import, _: &JobContext<'_, Import>| Err(boom().into()))
            .build(),
    );
    let mut import = created(&lc, 1);

    let err = lc.process(&mut import, false).unwrap_err();

    let fault = err.fault().expect("application fault");
    assert_eq!(fault.kind(), "RuntimeError");
    assert_eq!(fault.message(), "boom");

    assert_eq!(import.job.status(), JobStatus::ProcessingError);
    let detail = store.load(import.id).unwrap().error_detail;
    assert_eq!(detail.error(), Some("RuntimeError"));
    assert_eq!(detail.message(), Some("boom"));
    assert!(!detail.backtrace().is_empty());
    assert_eq!(store.meter_count(), 0);
    assert!(import.job.duration_total().unwrap() > 0.0);
}

#[test]
fn anyhow_errors_are_faults_too() {
    let (lc, _store) = setup(
        LifecycleConfig::builder(|_: &mut Import, _: &JobContext<'_, Import>| {
            let err = anyhow::anyhow!("upstream timed out");
            Err(Fault::from_anyhow(&err.context("fetching rows")))
        })
        .build(),
    );
    let mut import = created(&lc, 1);

    let err = lc.process(&mut import, false).unwrap_err();
    assert_eq!(
        import.job.error_detail().message(),
        Some("fetching rows: upstream timed out")
    );
    assert!(err.fault().is_some());
}

#[test]
fn reprocessing_a_completed_record() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let process_seen = seen.clone();
    let reprocess_seen = seen.clone();
    let (lc, store) = setup(
        LifecycleConfig::builder(move |import: &mut Import, _: &JobContext<'_, Import>| {
            process_seen
                .lock()
                .unwrap()
                .push(("process", import.job.status()));
            Ok(())
        })
        .reprocess_with(move |import: &mut Import, _: &JobContext<'_, Import>| {
            reprocess_seen
                .lock()
                .unwrap()
                .push(("reprocess", import.job.status()));
            Ok(())
        })
        .build(),
    );
    let mut import = created(&lc, 1);
    lc.process(&mut import, false).unwrap();
    let before = import.job.duration_total().unwrap();

    lc.reprocess(&mut import, false).unwrap();

    assert_eq!(import.job.status(), JobStatus::Completed);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("process", JobStatus::Processing),
            ("reprocess", JobStatus::Processing)
        ]
    );
    let after = import.job.duration_total().unwrap();
    assert!(after > before);
    assert_eq!(store.duration(import.id, "stint_duration").unwrap(), Some(after));
}

#[test]
fn reprocessing_a_pending_record_is_refused() {
    let (lc, _store) = setup(LifecycleConfig::<Import>::builder(|_, _| Ok(())).build());
    let mut import = created(&lc, 1);

    let err = lc.reprocess(&mut import, false).unwrap_err();
    assert!(err.is_precondition());
    assert_eq!(import.job.status(), JobStatus::Pending);
}

#[test]
fn failed_error_transition_falls_back_to_raw_write() {
    let notified = Arc::new(AtomicUsize::new(0));
    let notified_clone = notified.clone();
    let (lc, store) = setup(
        LifecycleConfig::builder(|_: &mut Import, _: &JobContext<'_, Import>| Err(boom().into()))
            .notifier(move |_| {
                notified_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
    );
    store.reject_transitions_into(JobStatus::ProcessingError);
    let mut import = created(&lc, 1);

    let err = lc.process(&mut import, false).unwrap_err();

    // The original fault still surfaces, not the persistence failure.
    assert_eq!(err.fault().map(Fault::kind), Some("RuntimeError"));
    let stored = store.load(import.id).unwrap();
    assert_eq!(stored.status, JobStatus::ProcessingError);
    assert_eq!(stored.error_detail.error(), Some(PERSISTENCE_FAILURE));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_fallback_never_masks_the_original_fault() {
    let (lc, store) = setup(
        LifecycleConfig::builder(|_: &mut Import, _: &JobContext<'_, Import>| Err(boom().into()))
            .build(),
    );
    store.reject_transitions_into(JobStatus::ProcessingError);
    store.reject_raw_writes(true);
    let mut import = created(&lc, 1);

    let err = lc.process(&mut import, false).unwrap_err();

    assert_eq!(err.fault().map(Fault::message), Some("boom"));
    assert_eq!(import.job.status(), JobStatus::ProcessingError);
    assert_eq!(stored_status(&store, import.id), JobStatus::Processing);
}

#[test]
fn failed_finish_becomes_a_processing_error() {
    let (lc, store) = setup(LifecycleConfig::<Import>::builder(|_, _| Ok(())).build());
    store.reject_transitions_into(JobStatus::Completed);
    let mut import = created(&lc, 1);

    let err = lc.process(&mut import, false).unwrap_err();

    assert_eq!(err.fault().map(Fault::kind), Some("StoreError"));
    assert_eq!(stored_status(&store, import.id), JobStatus::ProcessingError);
}

#[test]
fn validation_errors_are_recorded_not_raised() {
    let (lc, store) = setup(
        LifecycleConfig::builder(|import: &mut Import, ctx: &JobContext<'_, Import>| {
            import.job.errors_mut().add("successful", "is invalid");
            import.job.errors_mut().add("rows", "must be positive");
            ctx.store_validation_error(import);
            Ok(())
        })
        .build(),
    );
    let mut import = created(&lc, 1);

    lc.process(&mut import, false).unwrap();

    let stored = store.load(import.id).unwrap();
    assert_eq!(stored.status, JobStatus::ValidationError);
    assert_eq!(stored.error_detail.strings("successful"), vec!["is invalid".to_string()]);
    assert_eq!(stored.error_detail.strings("rows"), vec!["must be positive".to_string()]);
    assert!(lc.destroy(&mut import).unwrap());
}

#[test]
fn rejected_validation_transition_falls_back() {
    let (lc, store) = setup(
        LifecycleConfig::builder(|import: &mut Import, ctx: &JobContext<'_, Import>| {
            import.job.errors_mut().add("successful", "is invalid");
            ctx.store_validation_error(import);
            Ok(())
        })
        .build(),
    );
    store.reject_transitions_into(JobStatus::ValidationError);
    let mut import = created(&lc, 1);

    lc.process(&mut import, false).unwrap();

    let stored = store.load(import.id).unwrap();
    assert_eq!(stored.status, JobStatus::ValidationError);
    assert_eq!(stored.error_detail.error(), Some(PERSISTENCE_FAILURE));
}

#[test]
fn cancelling_a_pending_record_dequeues_once() {
    let gateway = Arc::new(CountingGateway::default());
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = ran.clone();
    let (lc, store) = setup(
        LifecycleConfig::builder(move |_: &mut Import, _: &JobContext<'_, Import>| {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .background(true)
        .gateway(gateway.clone())
        .build(),
    );
    let mut import = created(&lc, 1);
    lc.background_process(&mut import, None).unwrap();
    assert!(lc.is_queued(&import, None).unwrap());

    lc.cancel_and_dequeue(&mut import).unwrap();

    assert_eq!(import.job.status(), JobStatus::Cancelled);
    assert_eq!(stored_status(&store, import.id), JobStatus::Cancelled);
    assert_eq!(gateway.dequeue_calls(), 1);
    assert!(!lc.is_queued(&import, None).unwrap());

    // A cancelled record is never started.
    lc.process(&mut import, false).unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(import.job.status(), JobStatus::Cancelled);
}

#[test]
fn cancelling_a_finished_record_is_refused() {
    let (lc, _store) = setup(LifecycleConfig::<Import>::builder(|_, _| Ok(())).build());
    let mut import = created(&lc, 1);
    lc.process(&mut import, false).unwrap();

    let err = lc.cancel_and_dequeue(&mut import).unwrap_err();
    assert!(err.is_precondition());
    assert_eq!(import.job.status(), JobStatus::Completed);
}

fn cancel_while_processing(cooperative: bool) -> (JobStatus, JobStatus, usize) {
    let gateway = Arc::new(CountingGateway::default());
    let started = Arc::new(Barrier::new(2));
    let proceed = Arc::new(Barrier::new(2));
    let (work_started, work_proceed) = (started.clone(), proceed.clone());
    let (lc, _store) = setup(
        LifecycleConfig::builder(move |import: &mut Import, ctx: &JobContext<'_, Import>| {
            work_started.wait();
            work_proceed.wait();
            if cooperative && ctx.cancel_requested()? {
                ctx.confirm_cancelled(import)?;
            }
            Ok(())
        })
        .gateway(gateway.clone())
        .build(),
    );
    let import = created(&lc, 1);
    let mut observer = import.clone();

    let runner = {
        let lc = lc.clone();
        let mut import = import;
        thread::spawn(move || {
            let result = lc.process(&mut import, false);
            (import, result)
        })
    };

    started.wait();
    lc.cancel_and_dequeue(&mut observer).unwrap();
    let requested = observer.job.status();
    proceed.wait();

    let (import, result) = runner.join().unwrap();
    result.unwrap();
    (requested, import.job.status(), gateway.dequeue_calls())
}

#[test]
fn cancelling_a_processing_record_only_requests() {
    let (requested, final_status, dequeues) = cancel_while_processing(false);
    assert_eq!(requested, JobStatus::CancelRequested);
    // Not polled: the run completes despite the request.
    assert_eq!(final_status, JobStatus::Completed);
    assert_eq!(dequeues, 0);
}

#[test]
fn cooperative_work_confirms_cancellation() {
    let (requested, final_status, dequeues) = cancel_while_processing(true);
    assert_eq!(requested, JobStatus::CancelRequested);
    assert_eq!(final_status, JobStatus::Cancelled);
    assert_eq!(dequeues, 0);
}

#[test]
fn destroy_requires_a_terminal_status() {
    let (lc, store) = setup(LifecycleConfig::<Import>::builder(|_, _| Ok(())).build());
    let mut import = created(&lc, 1);

    assert!(!lc.destroy(&mut import).unwrap());
    assert_eq!(
        import.job.errors().get("status").to_vec(),
        vec!["Processing must be finished or cancelled, but status is 'pending'".to_string()]
    );
    assert_eq!(stored_status(&store, import.id), JobStatus::Pending);

    lc.cancel_and_dequeue(&mut import).unwrap();
    assert!(lc.destroy(&mut import).unwrap());
    assert!(store.load(import.id).is_err());
}

#[test]
fn duration_grows_with_every_attempt() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();
    let (lc, _store) = setup(
        LifecycleConfig::builder(move |_: &mut Import, _: &JobContext<'_, Import>| {
            if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(boom().into());
            }
            Ok(())
        })
        .build(),
    );
    let mut import = created(&lc, 1);

    assert!(lc.process(&mut import, false).is_err());
    let after_failure = import.job.duration_total().unwrap();
    assert!(after_failure > 0.0);

    lc.reprocess(&mut import, false).unwrap();
    assert!(import.job.duration_total().unwrap() > after_failure);
    assert_eq!(import.job.status(), JobStatus::Completed);
}

#[test]
fn stale_handles_do_not_restore_old_faults() {
    let gateway = Arc::new(FailFastGateway::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();
    let (lc, store) = setup(
        LifecycleConfig::builder(move |_: &mut Import, _: &JobContext<'_, Import>| {
            if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(boom().into());
            }
            Ok(())
        })
        .gateway(gateway.clone())
        .build(),
    );
    let mut import = created(&lc, 1);
    assert!(lc.process(&mut import, false).is_err());
    let mut stale = import.clone();
    assert_eq!(stale.job.error_detail().message(), Some("boom"));

    lc.reprocess(&mut import, false).unwrap();
    assert!(store.load(import.id).unwrap().error_detail.is_empty());

    lc.background_reprocess(&mut stale, Some(true)).unwrap();
    let stored = store.load(import.id).unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert!(stored.error_detail.is_empty());

    lc.cancel_and_dequeue(&mut stale).unwrap();
    let stored = store.load(import.id).unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.error_detail.is_empty());
}

#[test]
fn settings_drive_the_configuration() {
    let settings = LifecycleSettings::from_json(
        r#"{"queue": "imports", "progress_meter": false, "duration_field": "import_seconds"}"#,
    )
    .unwrap();
    let store = InMemoryRecordStore::arc();
    let lc = stint_infra::Lifecycle::new(
        LifecycleConfig::builder(|_: &mut Import, ctx: &JobContext<'_, Import>| {
            assert!(ctx.meter_id().is_none());
            Ok(())
        })
        .settings(&settings)
        .build(),
        store.clone(),
    );
    let mut import = created(&lc, 1);

    lc.process(&mut import, false).unwrap();
    assert_eq!(lc.queue_for(&import), "imports");
    assert!(store.duration(import.id, "import_seconds").unwrap().is_some());
    assert!(store.duration(import.id, "stint_duration").unwrap().is_none());
}

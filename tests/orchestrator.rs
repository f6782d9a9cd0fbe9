use std::sync::{Arc, Barrier};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_test::assert_ok;

use training_orchestra::{
    AnyModel, CancelToken, Dataset, ErrorPass, ErrorRate, Feedforward, IdleInhibitor, JobPhase,
    ModelConfig, Network, OrchestraError, Orchestrator, RoundObserver, Sample, SampleKind, Signal,
    TrainOutcome, TrainableNetwork, TrainingEvent, TrainingJob,
};

const RAW_ERROR: f32 = 0.123456;

/// A network whose training does nothing but follow the contract.
#[derive(Default)]
struct Scripted {
    len: usize,
    /// Pauses on a barrier after training this (round, index), twice.
    pause_at: Option<(usize, usize, Arc<Barrier>)>,
    /// Pauses on a barrier after scoring this (stride, index), twice.
    score_pause: Option<(usize, usize, Arc<Barrier>)>,
    fail_at: Option<(usize, usize)>,
    panic_at: Option<(usize, usize)>,
}

impl Network for Scripted {
    fn evaluate(&self, _input: &Signal) -> training_orchestra::Result<Signal> {
        Err(OrchestraError::Evaluation("scripted".into()))
    }

    fn describe_state(&self) -> String {
        "scripted".into()
    }
}

impl ErrorRate for Scripted {
    fn compute_error_rate(
        &self,
        stride: usize,
        cancel: &CancelToken,
        on_sample: &mut dyn FnMut(usize),
    ) -> ErrorPass {
        let mut visited = 0;
        for index in (0..self.len).step_by(stride) {
            if cancel.is_cancelled() {
                return ErrorPass {
                    completed_fully: false,
                    average: (visited > 0).then_some(RAW_ERROR),
                };
            }
            visited += 1;
            on_sample(index);

            if let Some((s, i, barrier)) = &self.score_pause {
                if (*s, *i) == (stride, index) {
                    barrier.wait();
                    barrier.wait();
                }
            }
        }

        ErrorPass {
            completed_fully: true,
            average: (visited > 0).then_some(RAW_ERROR),
        }
    }
}

impl TrainableNetwork for Scripted {
    fn bind_samples(&mut self, samples: Vec<Sample>) -> training_orchestra::Result<()> {
        self.len = Dataset::new(samples, SampleKind::Pair, 2, 1)?.len();
        Ok(())
    }

    fn dataset_len(&self) -> usize {
        self.len
    }

    fn train_rounds(
        &mut self,
        rounds: usize,
        cancel: &CancelToken,
        observer: &mut dyn RoundObserver,
    ) -> TrainOutcome {
        for round in 0..rounds {
            for index in 0..self.len {
                if cancel.is_cancelled() {
                    return TrainOutcome::Cancelled { rounds_done: round };
                }
                if self.fail_at == Some((round, index)) {
                    return TrainOutcome::Failed {
                        rounds_done: round,
                        error: OrchestraError::Evaluation("scripted fault".into()),
                    };
                }
                if self.panic_at == Some((round, index)) {
                    panic!("scripted panic");
                }

                observer.sample_done(round, index);

                if let Some((r, i, barrier)) = &self.pause_at {
                    if (*r, *i) == (round, index) {
                        barrier.wait();
                        barrier.wait();
                    }
                }
            }
            observer.round_done(round, Some(RAW_ERROR), &*self);
        }

        TrainOutcome::Completed
    }
}

fn samples(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| Sample::pair(vec![i as f32, 1.0], vec![0.0]))
        .collect()
}

async fn drain(job: &mut TrainingJob) -> Vec<TrainingEvent> {
    let mut events = Vec::new();
    while let Some(event) = job.next_event().await {
        events.push(event);
    }
    events
}

async fn rendezvous(barrier: &Arc<Barrier>) {
    let barrier = Arc::clone(barrier);
    assert_ok!(tokio::task::spawn_blocking(move || barrier.wait()).await);
}

#[derive(Default)]
struct CountingInhibitor {
    calls: Mutex<Vec<&'static str>>,
}

impl IdleInhibitor for CountingInhibitor {
    fn inhibit(&self) {
        self.calls.lock().push("inhibit");
    }

    fn release(&self) {
        self.calls.lock().push("release");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hundred_samples_five_rounds() {
    let orchestrator = Orchestrator::new(Scripted::default(), Handle::current());
    let mut job = assert_ok!(orchestrator.start_training(samples(100), 5));

    let events = drain(&mut job).await;
    let report = assert_ok!(job.wait().await);

    let sample_events: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TrainingEvent::SampleProgress { round, index } => Some((*round, *index)),
            _ => None,
        })
        .collect();
    assert_eq!(sample_events.len(), 500);
    assert!(sample_events.windows(2).all(|w| w[0] < w[1]));

    let rounds: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TrainingEvent::RoundProgress { round, .. } => Some(*round),
            _ => None,
        })
        .collect();
    assert_eq!(rounds, vec![0, 1, 2, 3, 4]);

    let estimates = events
        .iter()
        .filter(|e| matches!(e, TrainingEvent::ErrorEstimate(_)))
        .count();
    assert_eq!(estimates, 2);

    assert_eq!(
        events.last(),
        Some(&TrainingEvent::Finished {
            completed_fully: true,
            final_error: Some(0.123)
        })
    );
    assert!(report.completed_fully);
    assert_eq!(report.rounds_done, 5);
    assert_eq!(report.final_error, Some(0.123));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn final_pass_covers_every_sample_after_the_last_round() {
    let orchestrator = Orchestrator::new(Scripted::default(), Handle::current());
    let mut job = assert_ok!(orchestrator.start_training(samples(100), 5));
    let events = drain(&mut job).await;

    let finalizing = events
        .iter()
        .position(|e| *e == TrainingEvent::PhaseChanged(JobPhase::FinalizingError))
        .expect("a final pass");
    let last_round = events
        .iter()
        .rposition(|e| matches!(e, TrainingEvent::RoundProgress { .. }))
        .expect("round events");
    assert!(last_round < finalizing);

    let final_pass: Vec<_> = events[finalizing..]
        .iter()
        .filter_map(|e| match e {
            TrainingEvent::ErrorProgress { index } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(final_pass, (0..100).collect::<Vec<_>>());

    // Interim estimates walk one sample out of ten.
    let interim: Vec<_> = events[..finalizing]
        .iter()
        .filter_map(|e| match e {
            TrainingEvent::ErrorProgress { index } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(interim.len(), 20);
    assert_eq!(&interim[..3], &[0, 10, 20]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_stops_the_round_but_not_the_final_pass() {
    let barrier = Arc::new(Barrier::new(2));
    let network = Scripted {
        pause_at: Some((1, 3, Arc::clone(&barrier))),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(network, Handle::current());
    let mut job = assert_ok!(orchestrator.start_training(samples(10), 4));

    rendezvous(&barrier).await;
    job.cancel();
    rendezvous(&barrier).await;

    let events = drain(&mut job).await;
    let report = assert_ok!(job.wait().await);

    let last_sample = events
        .iter()
        .rev()
        .find_map(|e| match e {
            TrainingEvent::SampleProgress { round, index } => Some((*round, *index)),
            _ => None,
        });
    assert_eq!(last_sample, Some((1, 3)));

    let final_pass = events
        .iter()
        .skip_while(|e| **e != TrainingEvent::PhaseChanged(JobPhase::FinalizingError))
        .filter(|e| matches!(e, TrainingEvent::ErrorProgress { .. }))
        .count();
    assert_eq!(final_pass, 10);

    assert_eq!(
        events.last(),
        Some(&TrainingEvent::Finished {
            completed_fully: false,
            final_error: Some(0.123)
        })
    );
    assert_eq!(report.rounds_done, 1);
    assert!(!report.completed_fully);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_the_final_pass_reports_what_was_scored() {
    let barrier = Arc::new(Barrier::new(2));
    let network = Scripted {
        score_pause: Some((1, 5, Arc::clone(&barrier))),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(network, Handle::current());
    let mut job = assert_ok!(orchestrator.start_training(samples(100), 3));

    rendezvous(&barrier).await;
    job.cancel();
    rendezvous(&barrier).await;

    let events = drain(&mut job).await;
    let report = assert_ok!(job.wait().await);

    let final_pass: Vec<_> = events
        .iter()
        .skip_while(|e| **e != TrainingEvent::PhaseChanged(JobPhase::FinalizingError))
        .filter_map(|e| match e {
            TrainingEvent::ErrorProgress { index } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(final_pass, (0..=5).collect::<Vec<_>>());

    assert_eq!(
        events.last(),
        Some(&TrainingEvent::Finished {
            completed_fully: false,
            final_error: Some(0.123)
        })
    );
    assert_eq!(report.rounds_done, 3);
    assert!(!report.completed_fully);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_an_interim_estimate_skips_the_remaining_rounds() {
    let barrier = Arc::new(Barrier::new(2));
    // With 3 rounds the first estimate follows round 1 and walks every tenth sample.
    let network = Scripted {
        score_pause: Some((10, 20, Arc::clone(&barrier))),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(network, Handle::current());
    let mut job = assert_ok!(orchestrator.start_training(samples(100), 3));

    rendezvous(&barrier).await;
    job.cancel();
    rendezvous(&barrier).await;

    let events = drain(&mut job).await;
    let report = assert_ok!(job.wait().await);

    assert!(!events
        .iter()
        .any(|e| matches!(e, TrainingEvent::SampleProgress { round: 2, .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, TrainingEvent::ErrorEstimate(_))));

    let final_pass = events
        .iter()
        .skip_while(|e| **e != TrainingEvent::PhaseChanged(JobPhase::FinalizingError))
        .filter(|e| matches!(e, TrainingEvent::ErrorProgress { .. }))
        .count();
    assert_eq!(final_pass, 100);

    assert_eq!(
        events.last(),
        Some(&TrainingEvent::Finished {
            completed_fully: false,
            final_error: Some(0.123)
        })
    );
    assert_eq!(report.rounds_done, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_network_still_finishes_the_job() {
    let inhibitor = Arc::new(CountingInhibitor::default());
    let network = Scripted {
        panic_at: Some((1, 2)),
        ..Default::default()
    };
    let orchestrator =
        Orchestrator::new(network, Handle::current()).with_inhibitor(inhibitor.clone());
    let mut job = assert_ok!(orchestrator.start_training(samples(5), 3));

    let events = drain(&mut job).await;
    let report = assert_ok!(job.wait().await);

    assert_eq!(
        events.last(),
        Some(&TrainingEvent::Finished {
            completed_fully: false,
            final_error: None
        })
    );
    assert!(!report.completed_fully);
    assert_eq!(report.final_error, None);
    assert_eq!(report.rounds_done, 1);

    assert!(!orchestrator.is_running());
    assert_eq!(*inhibitor.calls.lock(), vec!["inhibit", "release"]);
    assert_eq!(orchestrator.try_network(|net| net.dataset_len()), Some(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fault_is_reported_as_incomplete() {
    let network = Scripted {
        fail_at: Some((2, 0)),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(network, Handle::current());
    let mut job = assert_ok!(orchestrator.start_training(samples(5), 3));

    let events = drain(&mut job).await;
    let report = assert_ok!(job.wait().await);

    assert!(!report.completed_fully);
    assert_eq!(report.rounds_done, 2);
    assert!(matches!(
        events.last(),
        Some(TrainingEvent::Finished {
            completed_fully: false,
            final_error: Some(_)
        })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejects_a_second_job_while_busy() {
    let barrier = Arc::new(Barrier::new(2));
    let network = Scripted {
        pause_at: Some((0, 0, Arc::clone(&barrier))),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(network, Handle::current());
    let mut job = assert_ok!(orchestrator.start_training(samples(3), 1));

    rendezvous(&barrier).await;
    assert!(orchestrator.is_running());
    assert!(matches!(
        orchestrator.start_training(samples(3), 1),
        Err(OrchestraError::JobInFlight)
    ));
    assert!(matches!(
        orchestrator.resume_training(1),
        Err(OrchestraError::JobInFlight)
    ));
    assert_eq!(orchestrator.try_network(|net| net.dataset_len()), None);
    assert_eq!(orchestrator.describe(), None);
    rendezvous(&barrier).await;

    assert_ok!(job.wait().await);
    assert!(!orchestrator.is_running());

    // The bound dataset is reused, pause point included.
    let mut again = assert_ok!(orchestrator.resume_training(1));
    rendezvous(&barrier).await;
    rendezvous(&barrier).await;
    assert!(assert_ok!(again.wait().await).completed_fully);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_samples_never_start_a_job() {
    let inhibitor = Arc::new(CountingInhibitor::default());
    let orchestrator = Orchestrator::new(Scripted::default(), Handle::current())
        .with_inhibitor(inhibitor.clone());

    assert!(matches!(
        orchestrator.start_training(Vec::new(), 3),
        Err(OrchestraError::EmptySamples)
    ));
    assert!(matches!(
        orchestrator.start_training(vec![Sample::pair(vec![1.0], vec![0.0])], 3),
        Err(OrchestraError::SampleWidthMismatch { .. })
    ));
    assert!(matches!(
        orchestrator.resume_training(3),
        Err(OrchestraError::NoDataset)
    ));

    assert!(!orchestrator.is_running());
    assert!(inhibitor.calls.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sequence_model_rejects_pair_samples() {
    let inhibitor = Arc::new(CountingInhibitor::default());
    let model = AnyModel::from_config(&ModelConfig::default(), 3, 3, Some(1));
    let orchestrator = Orchestrator::new(Feedforward::new(model), Handle::current())
        .with_inhibitor(inhibitor.clone());

    let pairs = vec![Sample::pair(vec![0.0; 3], vec![0.0; 3]); 4];
    assert!(matches!(
        orchestrator.start_training(pairs, 3),
        Err(OrchestraError::SampleKindMismatch {
            index: 0,
            expected: SampleKind::Sequence
        })
    ));
    assert!(matches!(
        orchestrator.resume_training(3),
        Err(OrchestraError::NoDataset)
    ));

    assert!(!orchestrator.is_running());
    assert!(inhibitor.calls.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_once_finished_is_delivered() {
    let inhibitor = Arc::new(CountingInhibitor::default());
    let orchestrator = Orchestrator::new(Scripted::default(), Handle::current())
        .with_inhibitor(inhibitor.clone());

    assert_eq!(
        orchestrator.describe().as_deref(),
        Some("scripted\nAvg. net error: unknown")
    );

    let mut job = assert_ok!(orchestrator.start_training(samples(20), 2));
    assert_eq!(inhibitor.calls.lock().first(), Some(&"inhibit"));

    while let Some(event) = job.next_event().await {
        if let TrainingEvent::Finished { .. } = event {
            assert!(!orchestrator.is_running());
            assert_eq!(*inhibitor.calls.lock(), vec!["inhibit", "release"]);
        }
    }

    assert_eq!(orchestrator.last_error(), Some(0.123));
    assert_eq!(
        orchestrator.describe().as_deref(),
        Some("scripted\nAvg. net error: 12.3%")
    );
}

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, info};
use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver},
    task::JoinHandle,
};

use super::{
    event::{JobReport, TrainingEvent},
    inhibit::{BusyGuard, IdleInhibitor, NoopInhibitor},
    job::{round_to_significant, JobDriver, JobMachine},
};
use crate::{
    cancel::CancelToken,
    config::TrainingConfig,
    data::Sample,
    error::{OrchestraError, Result},
    network::TrainableNetwork,
};

/// Runs training jobs for a single network in the background.
///
/// At most one job runs at a time. While it runs the job owns the network;
/// the caller only gets non-blocking access through [`Orchestrator::try_network`].
pub struct Orchestrator<N> {
    network: Arc<Mutex<N>>,
    busy: Arc<AtomicBool>,
    inhibitor: Arc<dyn IdleInhibitor>,
    last_error: Arc<Mutex<Option<f32>>>,
    runtime: Handle,
    config: TrainingConfig,
}

impl<N: TrainableNetwork + Send + 'static> Orchestrator<N> {
    /// Creates a new idle `Orchestrator`.
    ///
    /// # Arguments
    /// * `network` - The network every job trains.
    /// * `runtime` - The runtime whose blocking pool runs the jobs.
    ///
    /// # Returns
    /// A new `Orchestrator` with the default config and no idle inhibition.
    pub fn new(network: N, runtime: Handle) -> Self {
        Self {
            network: Arc::new(Mutex::new(network)),
            busy: Arc::new(AtomicBool::new(false)),
            inhibitor: Arc::new(NoopInhibitor),
            last_error: Arc::new(Mutex::new(None)),
            runtime,
            config: TrainingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the inhibitor that keeps the host awake while a job runs.
    pub fn with_inhibitor(mut self, inhibitor: Arc<dyn IdleInhibitor>) -> Self {
        self.inhibitor = inhibitor;
        self
    }

    /// Whether a job is in flight.
    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Binds `samples` to the network and starts training it for `rounds` rounds.
    ///
    /// # Arguments
    /// * `samples` - The new dataset, replacing any previously bound one.
    /// * `rounds` - The amount of full passes over the dataset.
    ///
    /// # Returns
    /// A handle to the running job.
    ///
    /// # Errors
    /// `JobInFlight` if a job is already running, or the binding error if the
    /// samples are empty or mis-shaped. No work starts in either case.
    pub fn start_training(&self, samples: Vec<Sample>, rounds: usize) -> Result<TrainingJob> {
        let guard = BusyGuard::acquire(&self.busy, &self.inhibitor)
            .ok_or(OrchestraError::JobInFlight)?;

        let dataset_len = {
            let mut net = self.network.lock();
            net.bind_samples(samples)?;
            net.dataset_len()
        };

        Ok(self.launch(guard, rounds, dataset_len))
    }

    /// Keeps training the network on its already bound dataset.
    ///
    /// # Errors
    /// `JobInFlight` if a job is already running, `NoDataset` if nothing was ever bound.
    pub fn resume_training(&self, rounds: usize) -> Result<TrainingJob> {
        let guard = BusyGuard::acquire(&self.busy, &self.inhibitor)
            .ok_or(OrchestraError::JobInFlight)?;

        let dataset_len = self.network.lock().dataset_len();
        if dataset_len == 0 {
            return Err(OrchestraError::NoDataset);
        }

        Ok(self.launch(guard, rounds, dataset_len))
    }

    /// Runs `f` on the network unless a job currently owns it.
    pub fn try_network<R>(&self, f: impl FnOnce(&N) -> R) -> Option<R> {
        if self.is_running() {
            return None;
        }
        self.network.try_lock().map(|net| f(&net))
    }

    /// The normalized error reported by the latest estimate or final pass.
    pub fn last_error(&self) -> Option<f32> {
        *self.last_error.lock()
    }

    /// Describes the network and its last known error as a percentage, `None`
    /// while a job runs.
    pub fn describe(&self) -> Option<String> {
        let state = self.try_network(|net| net.describe_state())?;
        let error = match self.last_error() {
            Some(error) => {
                let percent = round_to_significant(error * 100.0, self.config.significant_digits);
                format!("{percent}%")
            }
            None => "unknown".to_string(),
        };

        Some(format!("{state}\nAvg. net error: {error}"))
    }

    fn launch(&self, mut guard: BusyGuard, rounds: usize, dataset_len: usize) -> TrainingJob {
        guard.inhibit();

        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let machine = JobMachine::new(rounds, dataset_len, self.config.clone());
        let mut driver = JobDriver::new(machine, cancel.clone(), tx, Arc::clone(&self.last_error));
        let network = Arc::clone(&self.network);

        info!(rounds = rounds, samples = dataset_len; "starting training job");

        let handle = self.runtime.spawn_blocking(move || {
            let run = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut net = network.lock();
                driver.run(&mut *net, rounds)
            }));
            let report = match run {
                Ok(report) => report,
                Err(payload) => driver.abort(&panic_message(&*payload)),
            };

            // Idle before anyone hears about it.
            drop(guard);
            driver.finish();

            info!(
                completed_fully = report.completed_fully,
                rounds_done = report.rounds_done;
                "training job finished"
            );
            report
        });

        TrainingJob {
            cancel,
            events: rx,
            handle: Some(handle),
            report: None,
        }
    }
}

/// A running training job.
///
/// Dropping it does not stop the job; call [`TrainingJob::cancel`] for that.
pub struct TrainingJob {
    cancel: CancelToken,
    events: UnboundedReceiver<TrainingEvent>,
    handle: Option<JoinHandle<JobReport>>,
    report: Option<JobReport>,
}

impl TrainingJob {
    /// Requests the job to stop training at the next sample.
    ///
    /// The final error pass still runs afterwards.
    pub fn cancel(&self) {
        debug!("cancellation requested");
        self.cancel.cancel();
    }

    /// A token that cancels this job, for handing to other tasks.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Returns the next pending event without waiting, `None` if there is none yet.
    pub fn try_event(&mut self) -> Option<TrainingEvent> {
        self.events.try_recv().ok()
    }

    /// Waits for the next event, `None` once the job is over and every event was read.
    pub async fn next_event(&mut self) -> Option<TrainingEvent> {
        self.events.recv().await
    }

    /// Waits until the job is over.
    ///
    /// # Returns
    /// The job's report; pending events stay readable afterwards.
    ///
    /// # Errors
    /// `JobPanicked` if the job was torn down before reporting, e.g. by a runtime shutdown.
    pub async fn wait(&mut self) -> Result<JobReport> {
        if let Some(handle) = self.handle.take() {
            let report = handle
                .await
                .map_err(|e| OrchestraError::JobPanicked(e.to_string()))?;
            self.report = Some(report);
        }

        self.report
            .ok_or_else(|| OrchestraError::JobPanicked("the job never reported".to_string()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "the network panicked".to_string()
    }
}

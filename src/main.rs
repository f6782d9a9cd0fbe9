use std::{env, fs};

use anyhow::{bail, Context};
use log::{debug, info};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    runtime::Handle,
    signal,
};

use training_orchestra::{
    AnyModel, Config, Decoder, Feedforward, Orchestrator, SentenceVocabulary, TrainingEvent,
    VocabularyCodec,
};

const DEFAULT_ROUNDS: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let Some(corpus) = args.next() else {
        bail!("usage: training-orchestra <corpus.txt> [config.json] [rounds]");
    };
    let config = match args.next() {
        Some(path) => Config::load(&path).with_context(|| format!("loading config {path}"))?,
        None => Config::default(),
    };
    let rounds = match args.next() {
        Some(rounds) => rounds.parse().context("rounds must be a positive number")?,
        None => DEFAULT_ROUNDS,
    };

    let text = fs::read_to_string(&corpus).with_context(|| format!("reading {corpus}"))?;
    let vocabulary = SentenceVocabulary::from_text(&text, &config.vocabulary);
    let samples = vocabulary.training_samples(&text);
    info!(
        "{} sentences over a vocabulary of {} tokens",
        samples.len(),
        vocabulary.width()
    );

    let width = vocabulary.width();
    let model = AnyModel::from_config(&config.model, width, width, config.seed);
    let orchestrator = Orchestrator::new(Feedforward::new(model), Handle::current())
        .with_config(config.training.clone());

    let mut job = orchestrator.start_training(samples, rounds)?;
    let cancel = job.cancel_token();

    loop {
        tokio::select! {
            event = job.next_event() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            _ = signal::ctrl_c() => {
                info!("received SIGINT, stopping");
                cancel.cancel();
            }
        }
    }

    let report = job.wait().await?;
    info!(
        "trained {} round(s), completed fully: {}",
        report.rounds_done, report.completed_fully
    );
    if let Some(description) = orchestrator.describe() {
        println!("{description}");
    }

    let decoder = Decoder::new(vocabulary, config.decoder.clone());
    let mut lines = BufReader::new(io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let tokens = SentenceVocabulary::tokenize(&line);
        let prediction = orchestrator
            .try_network(|net| decoder.predict(net, &tokens[..]))
            .unwrap_or_default();
        println!("{}", prediction.join(" "));
    }

    Ok(())
}

fn log_event(event: &TrainingEvent) {
    match event {
        TrainingEvent::PhaseChanged(phase) => info!("{phase}"),
        TrainingEvent::SampleProgress { .. } | TrainingEvent::ErrorProgress { .. } => {}
        TrainingEvent::RoundProgress {
            round,
            rolling_error,
        } => match rolling_error {
            Some(error) => info!("round {} done, training error {error}", round + 1),
            None => info!("round {} done", round + 1),
        },
        TrainingEvent::ErrorEstimate(error) => info!("estimated error: {error}"),
        TrainingEvent::Finished {
            completed_fully,
            final_error,
        } => debug!("finished: completed_fully={completed_fully} final_error={final_error:?}"),
    }
}

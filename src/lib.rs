//! Background training orchestration and autoregressive decoding for small
//! neural networks.
//!
//! A network is anything implementing [`TrainableNetwork`]. The
//! [`Orchestrator`] trains it on tokio's blocking pool, reporting progress as
//! [`TrainingEvent`]s, and the [`Decoder`] continues token sequences with it.

pub mod cancel;
pub mod config;
pub mod data;
pub mod decode;
pub mod error;
pub mod network;
pub mod orchestra;
pub mod vocab;

pub use cancel::CancelToken;
pub use config::{Config, DecoderConfig, ModelConfig, TrainingConfig, VocabularyConfig};
pub use data::{Dataset, Sample, SampleKind};
pub use decode::{classify, Classification, Decoder};
pub use error::{OrchestraError, Result};
pub use network::{
    AnyModel, ErrorPass, ErrorRate, Feedforward, Network, RoundObserver, Signal, TrainOutcome,
    TrainableNetwork,
};
pub use orchestra::{
    IdleInhibitor, JobPhase, JobReport, NoopInhibitor, Orchestrator, TrainingEvent, TrainingJob,
};
pub use vocab::{HotVector, SentenceVocabulary, VocabularyCodec};

use ndarray::array;
use tokio::runtime::Handle;
use tokio_test::assert_ok;

use training_orchestra::{
    classify, AnyModel, DecoderConfig, Decoder, Feedforward, ModelConfig, Orchestrator, Sample,
    SentenceVocabulary, TrainingEvent, VocabularyCodec, VocabularyConfig,
};

const CORPUS: &str = "The cat sat on the mat. The dog sat on the rug. The cat ran. The dog ran.";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trains_an_elman_network_and_decodes_with_it() {
    let vocabulary = SentenceVocabulary::from_text(CORPUS, &VocabularyConfig::default());
    let samples = vocabulary.training_samples(CORPUS);
    let width = vocabulary.width();

    let config = ModelConfig::Elman {
        hidden: 16,
        learning_rate: 0.05,
        bptt_truncate: 4,
    };
    let model = AnyModel::from_config(&config, width, width, Some(7));
    let orchestrator = Orchestrator::new(Feedforward::new(model), Handle::current());

    let mut first = assert_ok!(orchestrator.start_training(samples, 1));
    let early = assert_ok!(first.wait().await).final_error.expect("an error value");

    let mut second = assert_ok!(orchestrator.resume_training(60));
    let mut finished = None;
    while let Some(event) = second.next_event().await {
        if let TrainingEvent::Finished { final_error, .. } = event {
            finished = final_error;
        }
    }
    let report = assert_ok!(second.wait().await);

    assert!(report.completed_fully);
    assert_eq!(report.final_error, finished);
    assert!(finished.expect("an error value") < early);

    let description = orchestrator.describe().expect("idle orchestrator");
    assert!(description.starts_with(&format!("Inputs: {width}, Recurrent layers: 16")));

    let decoder = Decoder::new(vocabulary, DecoderConfig::default());
    let prediction = orchestrator
        .try_network(|net| decoder.predict(net, &["the"]))
        .expect("idle orchestrator");

    assert!(!prediction.is_empty());
    assert!(prediction.len() <= 12);
    assert_eq!(prediction[0], "the");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trains_a_perceptron_classifier() {
    let config = ModelConfig::Perceptron {
        hidden: vec![8],
        learning_rate: 0.2,
        momentum: 0.5,
    };
    let model = AnyModel::from_config(&config, 2, 2, Some(3));
    let orchestrator = Orchestrator::new(Feedforward::new(model), Handle::current());

    // Class 0 when the first input dominates, class 1 otherwise.
    let samples = vec![
        Sample::pair(vec![1.0, 0.0], vec![1.0, 0.0]),
        Sample::pair(vec![0.9, 0.1], vec![1.0, 0.0]),
        Sample::pair(vec![0.0, 1.0], vec![0.0, 1.0]),
        Sample::pair(vec![0.1, 0.9], vec![0.0, 1.0]),
    ];

    let mut job = assert_ok!(orchestrator.start_training(samples, 300));
    assert!(assert_ok!(job.wait().await).completed_fully);

    let (left, right) = orchestrator
        .try_network(|net| {
            (
                classify(net, array![1.0, 0.0]),
                classify(net, array![0.0, 1.0]),
            )
        })
        .expect("idle orchestrator");

    assert_eq!(assert_ok!(left).class, 0);
    assert_eq!(assert_ok!(right).class, 1);
}

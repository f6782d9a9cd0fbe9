mod dataset;

pub use dataset::{Dataset, Sample, SampleKind};

pub mod backend;
pub mod external;
pub mod mock;
pub mod zero_shot;

pub use backend::{ClassificationFailure, LabelScore, TextClassifier};
pub use external::{ClassifierOutcome, ExternalClassifier};
pub use mock::MockClassifier;
pub use zero_shot::{ZeroShotClassifier, ZeroShotConfig};

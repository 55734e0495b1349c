// src/utils/constants.rs

// Identifier columns
pub const QID: &str = "qid";
pub const TID: &str = "tid";

// Attribute columns shared by both sides after preprocessing
pub const NAME: &str = "name";
pub const NAME_TOKENS: &str = "name_tokens";
pub const PSEUDONYM: &str = "pseudonym";
pub const PSEUDONYM_TOKENS: &str = "pseudonym_tokens";
pub const URL: &str = "url";
pub const URL_TOKENS: &str = "url_tokens";
pub const DESCRIPTION: &str = "description";
pub const DATE_OF_BIRTH: &str = "date_of_birth";
pub const BIRTH_PRECISION: &str = "birth_precision";
pub const DATE_OF_DEATH: &str = "date_of_death";
pub const DEATH_PRECISION: &str = "death_precision";

/// (date column, precision column) pairs merged during preprocessing.
pub const DATE_COLUMNS: [(&str, &str); 2] = [
    (DATE_OF_BIRTH, BIRTH_PRECISION),
    (DATE_OF_DEATH, DEATH_PRECISION),
];

/// (source column, derived token column) pairs built during preprocessing.
pub const TOKENIZED_COLUMNS: [(&str, &str); 2] =
    [(NAME, NAME_TOKENS), (PSEUDONYM, PSEUDONYM_TOKENS)];

/// Value assigned to a feature when either side has no data.
pub const FEATURE_MISSING_VALUE: f64 = 0.0;

/// Score at or above which a pair is a link.
pub const CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Rows requested per page from any data source.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Cap on the values per side considered in list cross products.
pub const MAX_VALUES_PER_SIDE: usize = 64;

/// Held-out share of training data used for early stopping.
pub const NN_VALIDATION_SPLIT: f64 = 0.33;

/// Epochs without validation improvement before training stops.
pub const NN_EARLY_STOPPING_PATIENCE: usize = 5;

pub const DEFAULT_SHARED_DIR: &str = "./shared";
pub const NN_CHECKPOINT_FOLDER: &str = "best_model_checkpoint";
pub const DEFAULT_SEED: u64 = 1984;

/// Folds used by evaluation and by stacked/gated ensembles.
pub const DEFAULT_EVALUATION_FOLDS: usize = 5;
pub const DEFAULT_ENSEMBLE_FOLDS: usize = 2;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    ///`row` is 1-based and does not count the header
    #[error("row {row}, column {column}: cannot parse {value:?} as an integer")]
    Parse {
        row: usize,
        column: usize,
        value: String,
    },

    #[error("row {row}: expected {expected} columns, found {found}")]
    ColumnCount {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row}: label {label} is outside 1..={classes}")]
    Label {
        row: usize,
        label: i64,
        classes: usize,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("missing state entry: {0}")]
    MissingState(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("empty dataset: {0}")]
    EmptyDataset(&'static str),

    #[error("cannot split {len} rows into {n_folds} folds")]
    Folds { n_folds: usize, len: usize },

    #[error("transform error: {0}")]
    Transform(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

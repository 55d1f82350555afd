use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("seed string must be at most {max} characters, got {got}")]
    SeedTooLong { max: usize, got: usize },

    #[error("invalid seed character '{0}': expected one of 1-9 or A-Z")]
    InvalidSeedChar(char),

    #[error("too many needs: {0} (maximum 32)")]
    TooManyNeeds(usize),

    #[error("too many wants: {0} (maximum 32)")]
    TooManyWants(usize),

    #[error("duplicate want (value={value}, joker_edition={joker_edition})")]
    DuplicateWant { value: u32, joker_edition: u32 },

    #[error("filter_name must be at most 63 characters, got {0}")]
    FilterNameTooLong(usize),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

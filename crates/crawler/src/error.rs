#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("a crawl is already in progress")]
    AlreadyRunning,

    #[error("crawl aborted")]
    Aborted,

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

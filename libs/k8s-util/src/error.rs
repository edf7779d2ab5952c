use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to list {0}: {1}")]
    ListFailed(&'static str, #[source] Box<kube::Error>),

    #[error("failed to create {0} {1}: {2}")]
    CreateFailed(&'static str, String, #[source] Box<kube::Error>),

    #[error("failed to update {0} {1}: {2}")]
    UpdateFailed(&'static str, String, #[source] Box<kube::Error>),

    #[error("failed to delete {0} {1}: {2}")]
    DeleteFailed(&'static str, String, #[source] Box<kube::Error>),

    #[error("rolling update of replication controller {0} -> {1} in namespace {2} timed out")]
    RollingUpdateTimeout(String, String, String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use crate::command::CommandError;

#[derive(Debug, thiserror::Error)]
pub enum LimaError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("could not determine SSH key from `limactl show-ssh` output")]
    MissingIdentityFile,

    #[error("command timed out after {0}s")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LimaError>;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Dependency(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("vm error: {0}")]
    Vm(#[from] limavm::LimaError),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;

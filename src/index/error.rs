#[derive(Debug, PartialEq, Eq)]
pub enum IndexError {
    InvalidConfig(&'static str),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::InvalidConfig(msg) => write!(f, "invalid index configuration: {msg}"),
        }
    }
}

impl std::error::Error for IndexError {}

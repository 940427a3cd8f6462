use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("script name is empty")]
    EmptyScriptName,
    #[error("invalid script name {0:?}: must not contain '/' or whitespace")]
    InvalidScriptName(String),
    #[error("failed to read script {path}: {source}")]
    ReadScript {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

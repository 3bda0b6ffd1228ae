use thiserror::Error;




/**
 * Errors raised while building a mesh, constructing task lists, or driving
 * the boundary exchange protocol. Transient incompleteness (a receive that
 * has not arrived yet) is never an error; it is reported through
 * `TaskStatus::Incomplete`.
 */
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("mesh topology error: {0}")]
    Topology(String),

    #[error("task dependency error: {0}")]
    Dependency(String),

    #[error("boundary protocol error on block {gid}: {message}")]
    Protocol { gid: usize, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("message encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("message decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not implemented")]
    Unsupported(&'static str),
}

impl Error {
    pub(crate) fn protocol(gid: usize, message: impl Into<String>) -> Self {
        Self::Protocol {
            gid,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

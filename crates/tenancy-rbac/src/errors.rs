use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RbacError {
    #[error("unknown rbac classification: {0}")]
    UnknownClass(String),
    #[error("unknown subject kind: {0}")]
    UnknownSubjectKind(String),
    #[error("unknown object kind: {0}")]
    UnknownObjectKind(String),
}

pub type RbacResult<T> = Result<T, RbacError>;

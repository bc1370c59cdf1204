use thiserror::Error;

pub type WfResult<T> = Result<T, WfError>;

#[derive(Error, Debug)]
pub enum WfError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}

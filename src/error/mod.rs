//! The unified error handling system for the pipeline.

use std::fmt::Display;

// 1. Core Types
pub use types::PipelineError;

/// A unified `Result` type for the entire crate.
///
/// All functions that can fail should return this type.
pub type Result<T> = std::result::Result<T, PipelineError>;

// 2. Module declarations
pub mod macros;
pub mod types;

// 3. Context Trait for adding context to errors.
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => {
                let context_message = context().to_string();
                Err(PipelineError::Context {
                    context: context_message,
                    source: Box::new(error.into()),
                })
            }
        }
    }
}

/// Helper to attach context to an error without intermediate boilerplate.
#[track_caller]
pub fn context_error<T>(err: impl Into<PipelineError>, context: impl Display) -> Result<T> {
    Err(err.into()).context(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_source() {
        let base: std::result::Result<(), PipelineError> =
            Err(PipelineError::cache("连接超时"));
        let wrapped = base.context("查询去重条目失败");
        let err = wrapped.unwrap_err();
        let text = format!("{err}");
        assert!(text.contains("查询去重条目失败"));
    }

    #[test]
    fn transient_classification() {
        assert!(PipelineError::cache("超时").is_transient());
        assert!(PipelineError::export("后端不可达").is_transient());
        assert!(!PipelineError::config("缺少字段").is_transient());
        assert!(!PipelineError::serialization_msg("无效 JSON").is_transient());
    }
}

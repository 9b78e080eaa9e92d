//! Handler invocation helpers.

use crate::error::HandlerError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Run a handler so that neither an error nor a panic escapes.
///
/// A panic is converted into `HandlerError::Panicked` carrying the panic
/// message when it is a string.
pub fn call_isolated<F>(f: F) -> Result<(), HandlerError>
where
    F: FnOnce() -> Result<(), HandlerError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(HandlerError::Panicked(msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_passes_through() {
        assert_eq!(call_isolated(|| Ok(())), Ok(()));
    }

    #[test]
    fn test_error_passes_through() {
        let result = call_isolated(|| Err(HandlerError::failed("boom")));
        assert_eq!(result, Err(HandlerError::Failed("boom".to_string())));
    }

    #[test]
    fn test_panic_is_caught() {
        let result = call_isolated(|| panic!("handler exploded"));
        assert_eq!(
            result,
            Err(HandlerError::Panicked("handler exploded".to_string()))
        );
    }

    #[test]
    fn test_formatted_panic_is_caught() {
        let item = "X";
        let result = call_isolated(|| panic!("bad item {item}"));
        assert_eq!(result, Err(HandlerError::Panicked("bad item X".to_string())));
    }
}

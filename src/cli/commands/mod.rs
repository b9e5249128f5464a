//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod archive;
pub mod export;
pub mod ingest;
pub mod init;
pub mod pipeline;
pub mod single;
pub mod status;
pub mod validate;
pub mod verify;

use crate::domain::DeltaError;

/// Exit code for an error that stopped a command before it produced a result
///
/// Configuration problems map to 2, everything else is fatal (5).
pub(crate) fn exit_code_for(error: &DeltaError) -> i32 {
    match error {
        DeltaError::Configuration(_) => 2,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_for() {
        assert_eq!(
            exit_code_for(&DeltaError::Configuration("bad".to_string())),
            2
        );
        assert_eq!(exit_code_for(&DeltaError::Store("gone".to_string())), 5);
    }
}

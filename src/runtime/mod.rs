//! Runtime abstraction for process environment access.
//!
//! Configuration is read through [`Runtime`] rather than `std::env` directly so
//! that tests can supply their own environment without mutating the process.

mod env;

use std::env as std_env;

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;
}

/// Reads the real process environment.
pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }
}

//! Application error type.
//!
//! Every failure carries the process exit code it should map to, so library
//! code can decide the code at the point where the failure is understood and
//! `main` only has to print and exit.

/// Bad arguments, invalid config, unreadable or malformed files.
pub const EXIT_USAGE: u8 = 2;
/// The dataset exists but has nothing usable in it.
pub const EXIT_DATA: u8 = 3;
/// A numerical routine failed (e.g. a singular regression system).
pub const EXIT_INTERNAL: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(EXIT_DATA, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EXIT_INTERNAL, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

use crate::domain::error::{AppError, Result};
use keyring::Entry;

/// Reads secrets stored under one OS keyring service.
pub struct KeyringManager {
    service: String,
}

impl KeyringManager {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    pub fn get_secret(&self, key: &str) -> Result<String> {
        let entry = Entry::new(&self.service, key)
            .map_err(|e| AppError::SecurityError(format!("Failed to open keyring entry: {}", e)))?;

        entry.get_password().map_err(|e| {
            AppError::SecurityError(format!(
                "No secret for {}/{}: {}",
                self.service, key, e
            ))
        })
    }
}

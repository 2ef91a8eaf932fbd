//! # Value Sources
//!
//! Where the value for a missing backend key comes from.
//!
//! - [`GeneratedValueSource`] produces random alphanumeric values
//! - [`PromptValueSource`] asks a [`Prompter`] for keys that are not generated
//!
//! Values are held in [`SecretValue`], which zeroizes its buffer on drop and never
//! prints its content.

use crate::config::Prompter;
use crate::constants::GENERATED_VALUE_LENGTH;
use crate::declaration::{SecretKeyDeclaration, ValueSourcing};
use crate::error::{Error, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use zeroize::Zeroizing;

/// A secret value in memory
#[derive(Clone)]
pub struct SecretValue(Zeroizing<String>);

impl SecretValue {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// Obtains values for keys that do not exist in the backend yet
pub trait ValueSource: Send + Sync {
    /// # Errors
    /// `Error::ValueSource` if no value can be obtained.
    fn value_for(&self, key: &SecretKeyDeclaration) -> Result<SecretValue>;
}

/// Random alphanumeric string of `len` characters
#[must_use]
pub fn generate_value(len: usize) -> SecretValue {
    let value: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    SecretValue::new(value)
}

/// Generates every value, ignoring `prompt`
///
/// Used for non-interactive runs where every missing key is declared `generate: true`.
/// Keys without `generate` fail instead of receiving a surprise random value.
#[derive(Debug, Clone)]
pub struct GeneratedValueSource {
    length: usize,
}

impl Default for GeneratedValueSource {
    fn default() -> Self {
        Self {
            length: GENERATED_VALUE_LENGTH,
        }
    }
}

impl GeneratedValueSource {
    #[must_use]
    pub fn with_length(length: usize) -> Self {
        Self { length }
    }
}

impl ValueSource for GeneratedValueSource {
    fn value_for(&self, key: &SecretKeyDeclaration) -> Result<SecretValue> {
        match key.sourcing() {
            ValueSourcing::Generate => Ok(generate_value(self.length)),
            ValueSourcing::Manual { .. } => Err(Error::ValueSource {
                remote_key: key.remote_key.clone(),
                message: "value must be entered manually but no interactive terminal is available"
                    .to_string(),
            }),
        }
    }
}

/// Generates values for `generate: true` keys and prompts for the rest
#[derive(Debug)]
pub struct PromptValueSource<P> {
    prompter: P,
    length: usize,
}

impl<P: Prompter> PromptValueSource<P> {
    #[must_use]
    pub fn new(prompter: P) -> Self {
        Self {
            prompter,
            length: GENERATED_VALUE_LENGTH,
        }
    }
}

impl<P: Prompter> ValueSource for PromptValueSource<P> {
    fn value_for(&self, key: &SecretKeyDeclaration) -> Result<SecretValue> {
        match key.sourcing() {
            ValueSourcing::Generate => Ok(generate_value(self.length)),
            ValueSourcing::Manual { prompt } => {
                let text = prompt.map_or_else(
                    || format!("Enter value for {} ({})", key.key, key.remote_key),
                    str::to_string,
                );
                let value = self.prompter.secret(&text)?;
                if value.is_empty() {
                    return Err(Error::ValueSource {
                        remote_key: key.remote_key.clone(),
                        message: "empty value entered".to_string(),
                    });
                }
                Ok(value)
            }
        }
    }
}

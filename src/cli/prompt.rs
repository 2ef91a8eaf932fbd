//! Terminal prompts backed by dialoguer.

use dialoguer::{Confirm, Input, Password, Select};
use secrets_provisioner::config::Prompter;
use secrets_provisioner::value_source::SecretValue;
use secrets_provisioner::{Error, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

fn prompt_error(prompt: &str, e: &dialoguer::Error) -> Error {
    Error::ValueSource {
        remote_key: prompt.to_string(),
        message: format!("prompt failed: {e}"),
    }
}

impl Prompter for TerminalPrompter {
    fn input(&self, prompt: &str) -> Result<String> {
        Input::<String>::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(|e| prompt_error(prompt, &e))
    }

    fn secret(&self, prompt: &str) -> Result<SecretValue> {
        Password::new()
            .with_prompt(prompt)
            .interact()
            .map(SecretValue::new)
            .map_err(|e| prompt_error(prompt, &e))
    }

    fn select(&self, prompt: &str, items: &[&str]) -> Result<usize> {
        Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()
            .map_err(|e| prompt_error(prompt, &e))
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| prompt_error(prompt, &e))
    }
}

//! Local encryption stage between the remote capture and the artifact file.

use crate::backup::events::EventLog;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::remote::process::{ProcessInput, StreamProcess};
use crate::backup::validate::validate_argv;
use bon::Builder;
use getset::Getters;
use std::fs::File;
use std::process::{ChildStdout, Command, Stdio};
use std::result;
use std::sync::Arc;
use std::time::Duration;
use validator::{Validate, ValidationError, ValidationErrors};

pub fn default_gpg_command() -> Vec<String> {
    ["gpg", "--batch", "--yes", "-e"].map(String::from).to_vec()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Encryptor {
    #[default]
    None,
    Gpg(GpgEncryptor),
}

/// Public key encryption through the local `gpg` binary.
#[derive(Clone, Debug, PartialEq, Eq, Builder, Getters)]
#[getset(get = "pub")]
pub struct GpgEncryptor {
    /// Everything before the `-r <key>` arguments
    #[builder(default = default_gpg_command())]
    command: Vec<String>,
    recipients: Vec<String>,
}

impl GpgEncryptor {
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.command.clone();
        for key in &self.recipients {
            argv.push("-r".to_string());
            argv.push(key.clone());
        }
        argv
    }

    /// Starts the filter reading `input` and writing the ciphertext to `output`.
    pub fn spawn(
        &self,
        host: &str,
        input: ChildStdout,
        output: File,
        events: Arc<EventLog>,
        timeout: Option<Duration>,
    ) -> std::io::Result<StreamProcess> {
        let argv = self.argv();
        let Some((program, args)) = argv.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "gpg command is empty",
            ));
        };
        let mut command = Command::new(program);
        command.args(args);
        tracing::info!("[{}] Encrypting for {:?}", host, self.recipients);
        StreamProcess::start(
            host,
            command,
            ProcessInput::Stdio(Stdio::from(input)),
            Stdio::from(output),
            events,
            timeout,
            None,
        )
    }
}

impl Validate for GpgEncryptor {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_argv(&self.command) {
            errors.add("gpg_command", e);
        }
        if self.recipients.is_empty() || self.recipients.iter().any(|k| k.trim().is_empty()) {
            errors.add(
                "gpg_key",
                ValidationError::new("InvalidKey").with_message("gpg key is empty".into()),
            );
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Validate for Encryptor {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            Encryptor::None => Ok(()),
            Encryptor::Gpg(inner) => inner.validate(),
        }
    }
}

impl FileExtProvider for Encryptor {
    fn file_ext(&self) -> Option<&'static str> {
        match self {
            Encryptor::None => None,
            Encryptor::Gpg(_) => Some("gpg"),
        }
    }
}

//! The YAML backup plan: a `default` entry plus one entry per host, in order.

use crate::backup::encrypt::{Encryptor, GpgEncryptor};
use crate::backup::host::{AuthConfig, HostConnection, HostSelector};
use crate::backup::job::{BackupTarget, JobSpec, DEFAULT_TIMEOUT};
use crate::backup::notifications::smtp::SmtpSettings;
use crate::backup::remote::RemoteCommand;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use crate::backup::validate::{validate_argv, validate_artifact_component};
use derive_more::Deref;
use itertools::Itertools;
use lettre::message::Mailbox;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt::Formatter;
use std::fs::File;
use std::marker::PhantomData;
use std::path::Path;
use std::result;
use std::time::Duration;
use validator::{Validate, ValidationError, ValidationErrors};

/// Key holding values every host inherits
pub static DEFAULT_KEY: &str = "default";

/// A YAML mapping that keeps its keys in document order and rejects duplicates.
#[derive(Clone, Debug, PartialEq, Deref)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        OrderedMap(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl<V> From<Vec<(String, V)>> for OrderedMap<V> {
    fn from(entries: Vec<(String, V)>) -> Self {
        OrderedMap(entries)
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a mapping")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> result::Result<Self::Value, A::Error> {
        let mut entries: Vec<(String, V)> = Vec::new();
        while let Some((key, value)) = map.next_entry::<String, V>()? {
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(serde::de::Error::custom(format!("duplicate key {key:?}")));
            }
            entries.push((key, value));
        }
        Ok(OrderedMap(entries))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// `gpg_key: K` or `gpg_key: [K1, K2]`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(one) => vec![one.clone()],
            OneOrMany::Many(many) => many.clone(),
        }
    }
}

/// One plan entry, `default` or a host.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostPlan {
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub pre: Vec<RemoteCommand>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub stdout: OrderedMap<RemoteCommand>,
    #[serde(default)]
    pub post: Vec<RemoteCommand>,
    pub gpg_key: Option<OneOrMany<String>>,
    pub gpg_command: Option<Vec<String>>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub mailto: Vec<String>,
    pub smtp: Option<SmtpSettings>,
}

impl Validate for HostPlan {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for command in self.pre.iter().chain(self.post.iter()) {
            if let Err(e) = command.validate() {
                errors.add("pre/post", ValidationError::new("InvalidCommand").with_message(
                    format!("{:?}: {}", command.label(), e).into(),
                ));
            }
        }
        for path in &self.paths {
            if let Err(e) = validate_artifact_component(path) {
                errors.add("paths", e);
            }
        }
        for (name, command) in self.stdout.iter() {
            if let Err(e) = validate_artifact_component(name) {
                errors.add("stdout", e);
            }
            if let Err(e) = command.validate() {
                errors.add("stdout", ValidationError::new("InvalidCommand").with_message(
                    format!("{:?}: {}", name, e).into(),
                ));
            }
        }
        if let Some(keys) = &self.gpg_key {
            let keys = keys.to_vec();
            if keys.is_empty() || keys.iter().any(|k| k.trim().is_empty()) {
                errors.add(
                    "gpg_key",
                    ValidationError::new("InvalidKey").with_message("gpg key is empty".into()),
                );
            }
        }
        if let Some(command) = &self.gpg_command {
            if let Err(e) = validate_argv(command) {
                errors.add("gpg_command", e);
            }
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            errors.add(
                "timeout",
                ValidationError::new("InvalidTimeout").with_message("timeout must not be 0".into()),
            );
        }
        for recipient in &self.mailto {
            if let Err(e) = validate_recipient(recipient) {
                errors.add("mailto", e);
            }
        }
        if let Some(smtp) = &self.smtp {
            if let Err(e) = smtp.validate() {
                errors.add(
                    "smtp",
                    ValidationError::new("InvalidSmtp").with_message(e.to_string().into()),
                );
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn validate_recipient(recipient: &str) -> result::Result<(), ValidationError> {
    if recipient.trim().is_empty() {
        return Err(ValidationError::new("InvalidRecipient")
            .with_message("report recipient is empty".into()));
    }
    if recipient.contains('@') && recipient.parse::<Mailbox>().is_err() {
        return Err(ValidationError::new("InvalidRecipient")
            .with_message(format!("{recipient:?} is not a valid email address").into()));
    }
    Ok(())
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "OrderedMap<Option<HostPlan>>")]
pub struct BackupPlan {
    default: HostPlan,
    hosts: Vec<(String, HostPlan)>,
}

impl From<OrderedMap<Option<HostPlan>>> for BackupPlan {
    fn from(map: OrderedMap<Option<HostPlan>>) -> Self {
        let mut plan = BackupPlan::default();
        for (key, entry) in map.0 {
            let entry = entry.unwrap_or_default();
            if key == DEFAULT_KEY {
                plan.default = entry;
            } else {
                plan.hosts.push((key, entry));
            }
        }
        plan
    }
}

impl BackupPlan {
    /// Reads and checks the plan file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let plan = File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader::<_, BackupPlan>(f).map_err(Error::from))
            .with_msg(format!("Parse YAML backup plan failed: {:?}", path))?;
        plan.check()
            .with_msg(format!("Backup plan validation failed: {:?}", path))?;
        Ok(plan)
    }

    pub fn check(&self) -> Result<()> {
        let mut errors = Vec::new();
        if let Err(e) = self.default.validate() {
            errors.push(Error::from(e).with_msg(DEFAULT_KEY));
        }
        for (key, host) in &self.hosts {
            if let Err(e) = validate_artifact_component(key) {
                errors.push(Error::from(e).with_msg(key.as_str()));
            }
            if let Err(e) = host.validate() {
                errors.push(Error::from(e).with_msg(key.as_str()));
            }
            if host.smtp.is_some() {
                errors.push(
                    Error::from(
                        ValidationError::new("InvalidSmtp")
                            .with_message("smtp is only read from the default entry".into()),
                    )
                    .with_msg(key.as_str()),
                );
            }
        }
        convert_error_vec(errors)
    }

    /// Host keys in plan order, `default` excluded.
    pub fn host_keys(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(|(key, _)| key.as_str())
    }

    fn host(&self, key: &str) -> Option<&HostPlan> {
        self.hosts.iter().find(|(k, _)| k == key).map(|(_, h)| h)
    }

    /// Report recipients of `key`; an unknown host reports to the default ones.
    pub fn recipients_for(&self, key: &str) -> Vec<String> {
        let host_mailto = self.host(key).map(|h| h.mailto.as_slice()).unwrap_or_default();
        self.default
            .mailto
            .iter()
            .chain(host_mailto)
            .unique()
            .cloned()
            .collect()
    }

    pub fn smtp(&self) -> SmtpSettings {
        self.default.smtp.clone().unwrap_or_default()
    }

    /// Merges `default` into the host's entry: lists are unioned (defaults
    /// first), scalars are overridden by the host.
    pub fn job_for(&self, selector: &HostSelector) -> Result<JobSpec> {
        let key = selector.key().as_str();
        let host = self
            .host(key)
            .ok_or_else(|| Error::UnknownHost(key.to_string()))?;
        let default = &self.default;

        let auth = merge_auth(default.auth.as_ref(), host.auth.as_ref());
        let connection = HostConnection::resolve(key, auth.as_ref(), selector.user().as_deref());

        let mut targets = default
            .paths
            .iter()
            .chain(host.paths.iter())
            .unique()
            .map(BackupTarget::path)
            .collect_vec();
        targets.extend(
            merge_stdout(&default.stdout, &host.stdout)
                .into_iter()
                .map(|(name, command)| BackupTarget::command(name, command)),
        );

        let keys = host
            .gpg_key
            .as_ref()
            .or(default.gpg_key.as_ref())
            .map(OneOrMany::to_vec);
        let encryptor = match keys {
            Some(recipients) => {
                let command = host
                    .gpg_command
                    .clone()
                    .or_else(|| default.gpg_command.clone());
                Encryptor::Gpg(
                    GpgEncryptor::builder()
                        .maybe_command(command)
                        .recipients(recipients)
                        .build(),
                )
            }
            None => Encryptor::None,
        };

        let job = JobSpec::builder()
            .host(key)
            .connection(connection)
            .pre(default.pre.iter().chain(host.pre.iter()).cloned().collect())
            .targets(targets)
            .post(default.post.iter().chain(host.post.iter()).cloned().collect())
            .encryptor(encryptor)
            .recipients(self.recipients_for(key))
            .timeout(host.timeout.or(default.timeout).unwrap_or(DEFAULT_TIMEOUT))
            .build();
        job.connection()
            .validate()
            .map_err(Error::from)
            .with_debug_object_and_fn_name(selector.clone(), "job_for")?;
        Ok(job)
    }
}

/// Field by field, the host's value wins; the address itself is never inherited.
fn merge_auth(default: Option<&AuthConfig>, host: Option<&AuthConfig>) -> Option<AuthConfig> {
    match (default, host) {
        (None, None) => None,
        (default, host) => {
            let default = default.cloned().unwrap_or_default();
            let host = host.cloned().unwrap_or_default();
            Some(AuthConfig {
                host: host.host,
                user: host.user.or(default.user),
                port: host.port.or(default.port),
                become_with: host.become_with.or(default.become_with),
            })
        }
    }
}

/// A host entry replaces a default entry of the same name in place.
fn merge_stdout(
    default: &OrderedMap<RemoteCommand>,
    host: &OrderedMap<RemoteCommand>,
) -> Vec<(String, RemoteCommand)> {
    let mut merged = default
        .iter()
        .map(|(name, command)| (name.clone(), host.get(name).unwrap_or(command).clone()))
        .collect_vec();
    merged.extend(
        host.iter()
            .filter(|(name, _)| default.get(name).is_none())
            .cloned(),
    );
    merged
}

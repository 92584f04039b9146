use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

/// `auth` record of a plan host. Every field is optional, the plan key is the
/// fallback address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    #[serde(rename = "become")]
    pub become_with: Option<String>,
}

/// How to reach one remote machine, with every default already resolved.
#[derive(Clone, Debug, PartialEq, Eq, Validate, Builder, Getters)]
#[getset(get = "pub")]
pub struct HostConnection {
    #[validate(length(min = 1))]
    #[builder(into)]
    host: String,
    #[builder(into)]
    user: Option<String>,
    port: Option<u16>,
    /// Privilege elevation prefix, e.g. `["sudo"]` or `["sudo", "-u", "postgres"]`
    #[builder(default)]
    become_argv: Vec<String>,
}

impl HostConnection {
    pub fn resolve(key: &str, auth: Option<&AuthConfig>, user_override: Option<&str>) -> Self {
        let auth = auth.cloned().unwrap_or_default();
        HostConnection {
            host: auth.host.unwrap_or_else(|| key.to_string()),
            user: user_override.map(str::to_string).or(auth.user),
            port: auth.port,
            become_argv: auth
                .become_with
                .map(|b| b.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

/// A host named on the command line, `[user@]host`.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct HostSelector {
    key: String,
    user: Option<String>,
}

impl HostSelector {
    pub fn from_key<S: Into<String>>(key: S) -> Self {
        HostSelector {
            key: key.into(),
            user: None,
        }
    }
}

impl FromStr for HostSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (user, key) = match s.split_once('@') {
            Some((user, key)) => (Some(user), key),
            None => (None, s),
        };
        if key.is_empty() || user.is_some_and(str::is_empty) {
            return Err(Error::UnknownHost(s.to_string()));
        }
        Ok(HostSelector {
            key: key.to_string(),
            user: user.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults_to_key() {
        let connection = HostConnection::resolve("db1", None, None);
        assert_eq!(connection.host(), "db1");
        assert!(connection.user().is_none());
        assert!(connection.port().is_none());
        assert!(connection.become_argv().is_empty());
    }

    #[test]
    fn test_resolve_uses_auth_and_override() {
        let auth = AuthConfig {
            host: Some("10.0.0.5".into()),
            user: Some("backup".into()),
            port: Some(2222),
            become_with: Some("sudo -n".into()),
        };
        let connection = HostConnection::resolve("db1", Some(&auth), Some("root"));
        assert_eq!(connection.host(), "10.0.0.5");
        assert_eq!(connection.user().as_deref(), Some("root"));
        assert_eq!(*connection.port(), Some(2222));
        assert_eq!(connection.become_argv(), &vec!["sudo".to_string(), "-n".to_string()]);
    }

    #[test]
    fn test_auth_become_key() {
        let auth: AuthConfig = serde_yml::from_str("user: root\nbecome: sudo\n").unwrap();
        assert_eq!(auth.become_with.as_deref(), Some("sudo"));
        assert!(serde_yml::from_str::<AuthConfig>("password: x\n").is_err());
    }

    #[test]
    fn test_host_selector_parse() {
        let plain: HostSelector = "web1".parse().unwrap();
        assert_eq!(plain.key(), "web1");
        assert!(plain.user().is_none());

        let with_user: HostSelector = "admin@web1".parse().unwrap();
        assert_eq!(with_user.key(), "web1");
        assert_eq!(with_user.user().as_deref(), Some("admin"));

        assert!("admin@".parse::<HostSelector>().is_err());
        assert!("@web1".parse::<HostSelector>().is_err());
    }

    #[test]
    fn test_connection_validation() {
        let connection = HostConnection::builder().host("").build();
        assert!(connection.validate().is_err());
        let connection = HostConnection::builder().host("db1").port(22).build();
        assert!(connection.validate().is_ok());
    }
}

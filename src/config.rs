// xiqaudit - Telnet exposure audit for ExtremeCloud IQ access points
// Copyright (C) 2025 xiqaudit contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::mailer::EmailSettings;
use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.extremecloudiq.com";
pub const DEFAULT_CLI_COMMAND: &str = "show run | inc telnet";
pub const DEFAULT_OUTPUT: &str = "device-list-telnet.csv";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_EMAIL_SUBJECT: &str = "Telnet Checker Report";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub base_url: Option<String>,
    pub audit: Option<AuditConfig>,
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    pub command: Option<String>,
    pub include_offline: Option<bool>,
    pub output: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
    #[error(
        "an API token or a username/password pair is required; set one with `xiqaudit configure ...`"
    )]
    MissingCredentials,
    #[error("email settings are incomplete; smtp username/password, from and to are required")]
    IncompleteEmail,
}

/// Bearer credential source, resolved from config plus CLI overrides.
#[derive(Debug, Clone)]
pub enum Credentials {
    Token(String),
    Login { username: String, password: String },
}

#[derive(Debug)]
pub struct EffectiveConfig {
    pub base_url: String,
    pub credentials: Credentials,
}

/// Everything the audit run needs after merging config and CLI flags.
#[derive(Debug)]
pub struct AuditSettings {
    pub command: String,
    pub include_offline: bool,
    pub output: String,
}

/// Whether and how to email the report after the run.
#[derive(Debug)]
pub enum EmailMode {
    Ready(EmailSettings),
    Disabled,
    NoRelay,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".xiqaudit.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("XIQAUDIT_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("xiqaudit").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?)?.unwrap_or_default();
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Config> {
    Ok(read_if_exists(&config_path(scope, cwd)?)?.unwrap_or_default())
}

pub fn save(scope: Scope, config: &Config, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(config).context("serializing config")?;
    fs::write(&path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

/// A non-empty token wins over a username/password pair.
pub fn resolve(
    cwd: &Path,
    token_override: Option<String>,
    base_url_override: Option<String>,
) -> Result<EffectiveConfig> {
    let mut merged = load(cwd)?;

    if let Some(token) = token_override {
        merged.token = Some(token);
    }
    if let Some(url) = base_url_override {
        merged.base_url = Some(url);
    }

    let base_url = merged
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let token = merged.token.map(|t| t.trim().to_string());
    let credentials = match token {
        Some(token) if !token.is_empty() => Credentials::Token(token),
        _ => match (merged.username, merged.password) {
            (Some(username), Some(password)) if !username.is_empty() => Credentials::Login {
                username,
                password,
            },
            _ => return Err(ConfigError::MissingCredentials.into()),
        },
    };

    Ok(EffectiveConfig {
        base_url,
        credentials,
    })
}

pub fn resolve_audit(
    merged: &Config,
    command_override: Option<String>,
    include_offline_override: Option<bool>,
    output_override: Option<String>,
) -> AuditSettings {
    let audit = merged.audit.clone().unwrap_or_default();
    AuditSettings {
        command: command_override
            .or(audit.command)
            .unwrap_or_else(|| DEFAULT_CLI_COMMAND.to_string()),
        include_offline: include_offline_override
            .or(audit.include_offline)
            .unwrap_or(true),
        output: output_override
            .or(audit.output)
            .unwrap_or_else(|| DEFAULT_OUTPUT.to_string()),
    }
}

pub fn resolve_email(merged: &Config, email_override: Option<bool>) -> Result<EmailMode> {
    let email = merged.email.clone().unwrap_or_default();
    let enabled = email_override.unwrap_or(email.enabled);
    if !enabled {
        return Ok(EmailMode::Disabled);
    }

    let smtp_host = match email.smtp_host {
        Some(host) if !host.is_empty() => host,
        _ => return Ok(EmailMode::NoRelay),
    };

    let (username, password, from) = match (email.username, email.password, email.from) {
        (Some(u), Some(p), Some(f)) => (u, p, f),
        _ => return Err(ConfigError::IncompleteEmail.into()),
    };
    if email.to.is_empty() {
        return Err(ConfigError::IncompleteEmail.into());
    }

    Ok(EmailMode::Ready(EmailSettings {
        smtp_host,
        smtp_port: email.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
        username,
        password,
        from,
        to: email.to,
        subject: email
            .subject
            .unwrap_or_else(|| DEFAULT_EMAIL_SUBJECT.to_string()),
    }))
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

fn merge(user: Config, local: Config) -> Config {
    Config {
        token: local.token.or(user.token),
        username: local.username.or(user.username),
        password: local.password.or(user.password),
        base_url: local.base_url.or(user.base_url),
        audit: match (user.audit, local.audit) {
            (Some(u), Some(l)) => Some(AuditConfig {
                command: l.command.or(u.command),
                include_offline: l.include_offline.or(u.include_offline),
                output: l.output.or(u.output),
            }),
            (u, l) => l.or(u),
        },
        email: local.email.or(user.email),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use tempfile::tempdir;

    static ENV_LOCK: OnceLock<std::sync::Mutex<()>> = OnceLock::new();

    fn isolate_env(cwd: &Path) -> std::sync::MutexGuard<'static, ()> {
        let guard = ENV_LOCK
            .get_or_init(|| std::sync::Mutex::new(()))
            .lock()
            .unwrap();
        env::set_var("XIQAUDIT_CONFIG_DIR", cwd.join("config"));
        fs::create_dir_all(cwd.join("config")).unwrap();
        guard
    }

    #[test]
    fn merges_user_and_local_and_overrides() {
        let cwd = tempdir().unwrap();
        let _guard = isolate_env(cwd.path());

        let user_cfg = Config {
            token: Some("user-token".into()),
            base_url: Some("https://user.test".into()),
            audit: Some(AuditConfig {
                command: Some("show run | inc telnet".into()),
                include_offline: Some(false),
                output: None,
            }),
            ..Config::default()
        };
        save(Scope::User, &user_cfg, cwd.path()).unwrap();

        let local_cfg = Config {
            token: Some("local-token".into()),
            ..Config::default()
        };
        save(Scope::Local, &local_cfg, cwd.path()).unwrap();

        let effective = resolve(cwd.path(), None, None).unwrap();
        assert_eq!(effective.base_url, "https://user.test");
        match effective.credentials {
            Credentials::Token(t) => assert_eq!(t, "local-token"),
            other => panic!("expected token credentials, got {:?}", other),
        }

        let merged = load(cwd.path()).unwrap();
        let audit = resolve_audit(&merged, None, None, Some("custom.csv".into()));
        assert_eq!(audit.command, DEFAULT_CLI_COMMAND);
        assert!(!audit.include_offline);
        assert_eq!(audit.output, "custom.csv");

        let overridden = resolve(cwd.path(), Some("cli-token".into()), None).unwrap();
        match overridden.credentials {
            Credentials::Token(t) => assert_eq!(t, "cli-token"),
            other => panic!("expected token credentials, got {:?}", other),
        }
    }

    #[test]
    fn empty_token_falls_back_to_login_credentials() {
        let cwd = tempdir().unwrap();
        let _guard = isolate_env(cwd.path());

        let cfg = Config {
            token: Some("".into()),
            username: Some("u@example.com".into()),
            password: Some("secret".into()),
            ..Config::default()
        };
        save(Scope::User, &cfg, cwd.path()).unwrap();

        let effective = resolve(cwd.path(), None, None).unwrap();
        match effective.credentials {
            Credentials::Login { username, password } => {
                assert_eq!(username, "u@example.com");
                assert_eq!(password, "secret");
            }
            other => panic!("expected login credentials, got {:?}", other),
        }
    }

    #[test]
    fn errors_when_missing_credentials() {
        let cwd = tempdir().unwrap();
        let _guard = isolate_env(cwd.path());

        let err = resolve(cwd.path(), None, None).unwrap_err();
        assert!(err.to_string().contains("token or a username/password"));
    }

    #[test]
    fn email_mode_reports_skip_reasons() {
        let merged = Config::default();
        assert!(matches!(
            resolve_email(&merged, None).unwrap(),
            EmailMode::Disabled
        ));
        assert!(matches!(
            resolve_email(&merged, Some(true)).unwrap(),
            EmailMode::NoRelay
        ));

        let incomplete = Config {
            email: Some(EmailConfig {
                enabled: true,
                smtp_host: Some("smtp.example.net".into()),
                ..EmailConfig::default()
            }),
            ..Config::default()
        };
        assert!(resolve_email(&incomplete, None).is_err());

        let complete = Config {
            email: Some(EmailConfig {
                enabled: true,
                smtp_host: Some("smtp.example.net".into()),
                smtp_port: None,
                username: Some("mailer".into()),
                password: Some("secret".into()),
                from: Some("audit@example.com".into()),
                to: vec!["ops@example.com".into()],
                subject: None,
            }),
            ..Config::default()
        };
        match resolve_email(&complete, None).unwrap() {
            EmailMode::Ready(settings) => {
                assert_eq!(settings.smtp_port, DEFAULT_SMTP_PORT);
                assert_eq!(settings.subject, DEFAULT_EMAIL_SUBJECT);
            }
            other => panic!("expected ready email mode, got {:?}", other),
        }
    }
}

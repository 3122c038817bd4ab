use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{AuthArg, Cli};
use crate::driver::RunMode;
use crate::error::{Error, Result};
use crate::kubernetes::AuthMode;
use crate::remediator::PassOptions;
use crate::rules::{MatchRule, RuleSet};
use crate::types::NamespaceScope;
use crate::utils::parse_duration;

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Name given to the rule built from command line flags.
pub const CLI_RULE_NAME: &str = "command-line";

/// Settings file layout. Every field is optional; flags take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub namespaces: Vec<String>,
    pub once: Option<bool>,
    pub polling_interval: Option<String>,
    pub settle_delay: Option<String>,
    pub pass_timeout: Option<String>,
    pub dry_run: Option<bool>,
    pub auth: Option<FileAuth>,
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileAuth {
    pub mode: AuthArg,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub name: String,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub message_regex: Option<String>,
    pub max_event_age: Option<String>,
}

impl FileConfig {
    pub fn from_yaml(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }
}

/// Fully resolved settings for one process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub rules: RuleSet,
    pub scope: NamespaceScope,
    pub run_mode: RunMode,
    pub pass: PassOptions,
    pub auth: AuthMode,
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::read(path).map_err(|e| {
                Error::Config(format!("could not load {}: {}", path.display(), e))
            })?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self> {
        let rules = resolve_rules(cli, &file)?;

        let namespaces = if cli.namespaces.is_empty() {
            file.namespaces
        } else {
            cli.namespaces.clone()
        };
        let scope = resolve_scope(namespaces)?;

        let once = cli.once || file.once.unwrap_or(false);
        let run_mode = if once {
            RunMode::Once
        } else {
            let every = pick_duration(cli.polling_interval, file.polling_interval.as_deref())?
                .unwrap_or(DEFAULT_POLLING_INTERVAL);
            if every.is_zero() {
                return Err(Error::Config("polling interval must be non-zero".to_string()));
            }
            RunMode::Interval(every)
        };

        let pass = PassOptions {
            settle_delay: pick_duration(cli.settle_delay, file.settle_delay.as_deref())?
                .unwrap_or(DEFAULT_SETTLE_DELAY),
            pass_timeout: pick_duration(cli.pass_timeout, file.pass_timeout.as_deref())?,
            dry_run: cli.dry_run || file.dry_run.unwrap_or(false),
        };
        if let Some(timeout) = pass.pass_timeout
            && timeout <= pass.settle_delay
        {
            return Err(Error::Config(format!(
                "pass timeout {:?} must be longer than the settle delay {:?}",
                timeout, pass.settle_delay
            )));
        }

        let auth = resolve_auth(cli, file.auth)?;

        Ok(Self {
            rules,
            scope,
            run_mode,
            pass,
            auth,
        })
    }
}

fn pick_duration(flag: Option<Duration>, file: Option<&str>) -> Result<Option<Duration>> {
    match (flag, file) {
        (Some(d), _) => Ok(Some(d)),
        (None, Some(s)) => parse_duration(s).map(Some).map_err(Error::Config),
        (None, None) => Ok(None),
    }
}

fn build_rule(
    name: &str,
    reason: Option<&str>,
    message: Option<&str>,
    message_regex: Option<&str>,
    max_age: Option<Duration>,
) -> Result<MatchRule> {
    let rule = match (message, message_regex) {
        (Some(_), Some(_)) => {
            return Err(Error::Config(format!(
                "rule '{}': set either message or message_regex, not both",
                name
            )));
        }
        (Some(m), None) if m.trim().is_empty() => {
            return Err(Error::Config(format!("rule '{}': empty message", name)));
        }
        (Some(m), None) => MatchRule::contains(reason, m),
        (None, Some(re)) if re.trim().is_empty() => {
            return Err(Error::Config(format!("rule '{}': empty message_regex", name)));
        }
        (None, Some(re)) => MatchRule::pattern(reason, re)?,
        (None, None) => {
            return Err(Error::Config(format!(
                "rule '{}': a message or message_regex is required",
                name
            )));
        }
    };
    Ok(rule.with_max_age(max_age))
}

fn resolve_rules(cli: &Cli, file: &FileConfig) -> Result<RuleSet> {
    let mut rules = RuleSet::new();
    for rc in &file.rules {
        if rc.name.is_empty() {
            return Err(Error::Config("rule with empty name".to_string()));
        }
        let max_age = rc
            .max_event_age
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(Error::Config)?;
        let rule = build_rule(
            &rc.name,
            rc.reason.as_deref(),
            rc.message.as_deref(),
            rc.message_regex.as_deref(),
            max_age,
        )?;
        rules.insert(rc.name.clone(), rule);
    }

    let has_cli_rule = cli.error_message.is_some() || cli.message_regex.is_some();
    if has_cli_rule {
        let rule = build_rule(
            CLI_RULE_NAME,
            cli.reason.as_deref(),
            cli.error_message.as_deref(),
            cli.message_regex.as_deref(),
            cli.max_event_age,
        )?;
        rules.insert(CLI_RULE_NAME, rule);
    } else if cli.reason.is_some() || cli.max_event_age.is_some() {
        return Err(Error::Config(
            "--reason and --max-event-age need --error-message or --message-regex".to_string(),
        ));
    }

    if rules.is_empty() {
        return Err(Error::Config(
            "no match rule configured; pass --error-message or a config file with rules"
                .to_string(),
        ));
    }
    Ok(rules)
}

fn resolve_scope(namespaces: Vec<String>) -> Result<NamespaceScope> {
    let mut unique: Vec<String> = Vec::new();
    for ns in namespaces {
        let ns = ns.trim().to_string();
        if ns.is_empty() {
            return Err(Error::Config("empty namespace name".to_string()));
        }
        if !unique.contains(&ns) {
            unique.push(ns);
        }
    }
    if unique.is_empty() {
        Ok(NamespaceScope::All)
    } else {
        Ok(NamespaceScope::Only(unique))
    }
}

fn resolve_auth(cli: &Cli, file: Option<FileAuth>) -> Result<AuthMode> {
    let explicit_kubeconfig = cli.kubeconfig.is_some() || cli.context.is_some();
    let kubeconfig = |path: Option<PathBuf>, context: Option<String>| AuthMode::Kubeconfig {
        path: cli.kubeconfig.clone().or(path),
        context: cli.context.clone().or(context),
    };

    let mode = match cli.auth {
        Some(AuthArg::Kubeconfig) => kubeconfig(None, None),
        Some(other) if explicit_kubeconfig => {
            return Err(Error::Config(format!(
                "--kubeconfig/--context cannot be combined with --auth {:?}",
                other
            )));
        }
        Some(AuthArg::Infer) => AuthMode::Infer,
        Some(AuthArg::InCluster) => AuthMode::InCluster,
        None if explicit_kubeconfig => match file {
            Some(f) if f.mode == AuthArg::Kubeconfig => kubeconfig(f.kubeconfig, f.context),
            _ => kubeconfig(None, None),
        },
        None if cli.in_cluster => AuthMode::InCluster,
        None => match file {
            Some(f) => match f.mode {
                AuthArg::Infer => AuthMode::Infer,
                AuthArg::InCluster => AuthMode::InCluster,
                AuthArg::Kubeconfig => AuthMode::Kubeconfig {
                    path: f.kubeconfig,
                    context: f.context,
                },
            },
            None => AuthMode::Infer,
        },
    };
    Ok(mode)
}

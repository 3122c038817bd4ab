use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::parse_duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthArg {
    Infer,
    InCluster,
    Kubeconfig,
}

#[derive(Parser, Debug)]
#[command(name = "pending-pod-reaper")]
#[command(about = "Delete Pending pods whose events show a known failure")]
pub struct Cli {
    /// Event message substring to match (case-sensitive)
    #[arg(short = 'm', long)]
    pub error_message: Option<String>,

    /// Event message regex, instead of a substring
    #[arg(long, conflicts_with = "error_message")]
    pub message_regex: Option<String>,

    /// Only match events with this reason (e.g. Failed)
    #[arg(short = 'r', long)]
    pub reason: Option<String>,

    /// Ignore events last seen longer ago than this (e.g. 10m)
    #[arg(long, value_parser = parse_duration)]
    pub max_event_age: Option<Duration>,

    /// Namespace to scan (repeatable); defaults to all namespaces
    #[arg(short = 'n', long = "namespace")]
    pub namespaces: Vec<String>,

    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,

    /// Time between passes [default: 10s]
    #[arg(short = 'i', long, value_parser = parse_duration)]
    pub polling_interval: Option<Duration>,

    /// Wait before deleting and re-check the pod is still Pending [default: 5s]
    #[arg(long, value_parser = parse_duration)]
    pub settle_delay: Option<Duration>,

    /// Abort a pass that runs longer than this
    #[arg(long, value_parser = parse_duration)]
    pub pass_timeout: Option<Duration>,

    /// Log matching pods without deleting them
    #[arg(long)]
    pub dry_run: bool,

    /// How to authenticate to the cluster [default: infer]
    #[arg(long, value_enum)]
    pub auth: Option<AuthArg>,

    /// Use in-cluster service account credentials (ignored when --auth is given)
    #[arg(
        long,
        env = "KUBE_AUTH_INSIDE_CLUSTER",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub in_cluster: bool,

    /// Path to kubeconfig (implies --auth kubeconfig)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context (implies --auth kubeconfig)
    #[arg(long)]
    pub context: Option<String>,

    /// YAML settings file; flags override its values
    #[arg(short = 'f', long)]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

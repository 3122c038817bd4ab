#[cfg(test)]
mod tests {
    use crate::cli::{AuthArg, Cli};
    use crate::config::{CLI_RULE_NAME, FileConfig, Settings};
    use crate::driver::RunMode;
    use crate::kubernetes::AuthMode;
    use crate::rules::{self, MatchRule, RuleSet};
    use crate::types::{EventRecord, NamespaceScope, PodPhase};
    use crate::utils;
    use chrono::{TimeZone, Utc};
    use clap::Parser;
    use std::path::PathBuf;
    use std::time::Duration;

    fn event(reason: &str, message: &str) -> EventRecord {
        EventRecord {
            namespace: "default".to_string(),
            pod_name: "test-pod-42".to_string(),
            pod_uid: None,
            reason: reason.to_string(),
            message: message.to_string(),
            type_: None,
            count: None,
            last_timestamp: None,
        }
    }

    /// Parses flags with `--in-cluster` taken only from `args`, so a
    /// KUBE_AUTH_INSIDE_CLUSTER set in the test environment has no effect.
    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["pending-pod-reaper"];
        argv.extend_from_slice(args);
        let mut cli = Cli::try_parse_from(argv).unwrap();
        cli.in_cluster = args.contains(&"--in-cluster");
        cli
    }

    fn resolve(args: &[&str]) -> crate::error::Result<Settings> {
        Settings::resolve(&parse(args), FileConfig::default())
    }

    #[test]
    fn test_cli_parsing_error_message() {
        let args = vec!["pending-pod-reaper", "--error-message", "Failed to pull image"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.error_message, Some("Failed to pull image".to_string()));
        assert!(cli.reason.is_none());
        assert!(!cli.once);
    }

    #[test]
    fn test_cli_parsing_namespaces() {
        let args = vec!["pending-pod-reaper", "-m", "x", "-n", "default", "-n", "jobs"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.namespaces, vec!["default".to_string(), "jobs".to_string()]);
    }

    #[test]
    fn test_cli_parsing_durations() {
        let args = vec![
            "pending-pod-reaper",
            "-m",
            "x",
            "-i",
            "30s",
            "--settle-delay",
            "0",
            "--max-event-age",
            "10m",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.polling_interval, Some(Duration::from_secs(30)));
        assert_eq!(cli.settle_delay, Some(Duration::ZERO));
        assert_eq!(cli.max_event_age, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_cli_parsing_bad_duration() {
        let args = vec!["pending-pod-reaper", "-m", "x", "-i", "soon"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_message_and_regex_conflict() {
        let args = vec!["pending-pod-reaper", "-m", "x", "--message-regex", "y"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_parsing_auth() {
        let args = vec!["pending-pod-reaper", "-m", "x", "--auth", "in-cluster"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.auth, Some(AuthArg::InCluster));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(utils::parse_duration("10"), Ok(Duration::from_secs(10)));
        assert_eq!(utils::parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(utils::parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(utils::parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert!(utils::parse_duration("").is_err());
        assert!(utils::parse_duration("5d").is_err());
        assert!(utils::parse_duration("m").is_err());
    }

    #[test]
    fn test_format_age() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let at = |secs: i64| now - chrono::Duration::seconds(secs);
        assert_eq!(utils::format_age(at(42), now), "42s");
        assert_eq!(utils::format_age(at(7 * 60), now), "7m");
        assert_eq!(utils::format_age(at(3 * 3600), now), "3h");
        assert_eq!(utils::format_age(at(2 * 86400), now), "2d");
    }

    #[test]
    fn test_to_utc_reads_wire_timestamp() {
        let time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time =
            serde_json::from_str("\"2024-05-01T12:00:00Z\"").unwrap();
        assert_eq!(
            utils::to_utc(&time),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_pod_phase_from_status() {
        assert_eq!(PodPhase::from_status(Some("Pending")), PodPhase::Pending);
        assert_eq!(PodPhase::from_status(Some("Running")), PodPhase::Running);
        assert_eq!(PodPhase::from_status(Some("Evicted")), PodPhase::Unknown);
        assert_eq!(PodPhase::from_status(None), PodPhase::Unknown);
    }

    #[test]
    fn test_rule_matches_reason_and_substring() {
        let rule = MatchRule::contains(Some("Failed"), "Failed to pull image");
        let now = Utc::now();
        let pull = event("Failed", "Failed to pull image \"wrongimage\": not found");
        let scheduled = event("Scheduled", "Successfully assigned default/test-pod-42");
        let wrong_reason = event("BackOff", "Failed to pull image \"wrongimage\"");

        assert!(rules::matches(&[scheduled.clone(), pull], &rule, now));
        assert!(!rules::matches(&[scheduled], &rule, now));
        assert!(!rules::matches(&[wrong_reason], &rule, now));
        assert!(!rules::matches(&[], &rule, now));
    }

    #[test]
    fn test_rule_substring_is_case_sensitive() {
        let rule = MatchRule::contains(None, "Failed to pull image");
        let lower = event("Failed", "failed to pull image \"wrongimage\"");
        assert!(!rules::matches(&[lower], &rule, Utc::now()));
    }

    #[test]
    fn test_rule_without_reason_matches_any_reason() {
        let rule = MatchRule::contains(None, "ErrImagePull");
        let e = event("Whatever", "Error: ErrImagePull");
        assert!(rules::matches(&[e], &rule, Utc::now()));
    }

    #[test]
    fn test_rule_regex() {
        let rule = MatchRule::pattern(None, r#"pull(ing)? image "[^"]+": .*not found"#).unwrap();
        let e = event("Failed", "Failed to pull image \"wrongimage\": manifest not found");
        assert!(rules::matches(&[e], &rule, Utc::now()));
        assert!(MatchRule::pattern(None, "(unclosed").is_err());
    }

    #[test]
    fn test_rule_max_age_ignores_stale_events() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let rule = MatchRule::contains(None, "Failed to pull image")
            .with_max_age(Some(Duration::from_secs(600)));

        let mut stale = event("Failed", "Failed to pull image \"x\"");
        stale.last_timestamp = Some(now - chrono::Duration::minutes(30));
        let mut recent = stale.clone();
        recent.last_timestamp = Some(now - chrono::Duration::minutes(2));
        let mut undated = stale.clone();
        undated.last_timestamp = None;

        assert!(!rules::matches(&[stale], &rule, now));
        assert!(rules::matches(&[recent], &rule, now));
        assert!(rules::matches(&[undated], &rule, now));
    }

    #[test]
    fn test_rule_set_first_match_reports_latest_event() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut set = RuleSet::new();
        set.insert("quota", MatchRule::contains(None, "exceeded quota"));
        set.insert("image-pull", MatchRule::contains(Some("Failed"), "Failed to pull image"));

        let mut older = event("Failed", "Failed to pull image \"a\"");
        older.last_timestamp = Some(now - chrono::Duration::minutes(5));
        let mut newer = event("Failed", "Failed to pull image \"b\"");
        newer.last_timestamp = Some(now - chrono::Duration::minutes(1));
        let events = vec![newer.clone(), older];

        let hit = set.first_match(&events, now).unwrap();
        assert_eq!(hit.rule, "image-pull");
        assert_eq!(hit.event.message, newer.message);
        assert!(set.first_match(&[event("Scheduled", "ok")], now).is_none());
    }

    #[test]
    fn test_rule_set_insert_replaces_by_name() {
        let mut set = RuleSet::new();
        set.insert("a", MatchRule::contains(None, "one"));
        set.insert("b", MatchRule::contains(None, "two"));
        set.insert("a", MatchRule::contains(None, "three"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = resolve(&["-m", "Failed to pull image"]).unwrap();
        assert_eq!(settings.scope, NamespaceScope::All);
        assert_eq!(settings.run_mode, RunMode::Interval(Duration::from_secs(10)));
        assert_eq!(settings.pass.settle_delay, Duration::from_secs(5));
        assert!(settings.pass.pass_timeout.is_none());
        assert!(!settings.pass.dry_run);
        assert_eq!(settings.auth, AuthMode::Infer);
        assert_eq!(settings.rules.names().collect::<Vec<_>>(), vec![CLI_RULE_NAME]);
    }

    #[test]
    fn test_settings_require_a_rule() {
        assert!(resolve(&[]).is_err());
        assert!(resolve(&["--reason", "Failed"]).is_err());
        assert!(resolve(&["-m", ""]).is_err());
        assert!(resolve(&["-m", "  "]).is_err());
        assert!(resolve(&["--message-regex", ""]).is_err());
        assert!(resolve(&["--message-regex", " \t"]).is_err());
        assert!(resolve(&["--message-regex", "ErrImage(Pull|NeverPull)"]).is_ok());
    }

    #[test]
    fn test_settings_pass_timeout_must_outlast_settle_delay() {
        let short = ["-m", "x", "--settle-delay", "200ms", "--pass-timeout", "50ms"];
        assert!(resolve(&short).is_err());
        assert!(resolve(&["-m", "x", "--pass-timeout", "5s"]).is_err());

        let settings = resolve(&["-m", "x", "--pass-timeout", "2m"]).unwrap();
        assert_eq!(settings.pass.pass_timeout, Some(Duration::from_secs(120)));

        let no_settle =
            resolve(&["-m", "x", "--settle-delay", "0s", "--pass-timeout", "1s"]).unwrap();
        assert_eq!(no_settle.pass.settle_delay, Duration::ZERO);
    }

    #[test]
    fn test_settings_once_and_namespaces() {
        let settings = resolve(&[
            "-m", "x", "--once", "-n", "jobs", "-n", "jobs", "-n", "ci",
        ])
        .unwrap();
        assert_eq!(settings.run_mode, RunMode::Once);
        assert_eq!(
            settings.scope,
            NamespaceScope::Only(vec!["jobs".to_string(), "ci".to_string()])
        );
    }

    #[test]
    fn test_settings_zero_interval_rejected() {
        assert!(resolve(&["-m", "x", "-i", "0s"]).is_err());
    }

    #[test]
    fn test_settings_auth_selection() {
        let kube = resolve(&["-m", "x", "--context", "staging"]).unwrap();
        assert_eq!(
            kube.auth,
            AuthMode::Kubeconfig {
                path: None,
                context: Some("staging".to_string())
            }
        );

        let in_cluster = resolve(&["-m", "x", "--auth", "in-cluster"]).unwrap();
        assert_eq!(in_cluster.auth, AuthMode::InCluster);

        let flag = resolve(&["-m", "x", "--in-cluster"]).unwrap();
        assert_eq!(flag.auth, AuthMode::InCluster);

        assert!(resolve(&["-m", "x", "--auth", "in-cluster", "--context", "staging"]).is_err());
    }

    #[test]
    fn test_file_config_merge() {
        let yaml = r#"
namespaces: [batch]
polling_interval: 1m
settle_delay: 0s
dry_run: true
auth:
  mode: kubeconfig
  kubeconfig: /etc/reaper/kubeconfig
rules:
  - name: image-pull
    reason: Failed
    message: Failed to pull image
  - name: missing-volume
    message_regex: 'persistentvolumeclaim "[^"]+" not found'
    max_event_age: 15m
"#;
        let file = FileConfig::from_yaml(yaml).unwrap();
        let cli = parse(&["-n", "override"]);
        let settings = Settings::resolve(&cli, file).unwrap();

        assert_eq!(
            settings.rules.names().collect::<Vec<_>>(),
            vec!["image-pull", "missing-volume"]
        );
        assert_eq!(
            settings.scope,
            NamespaceScope::Only(vec!["override".to_string()])
        );
        assert_eq!(settings.run_mode, RunMode::Interval(Duration::from_secs(60)));
        assert_eq!(settings.pass.settle_delay, Duration::ZERO);
        assert!(settings.pass.dry_run);
        assert_eq!(
            settings.auth,
            AuthMode::Kubeconfig {
                path: Some(PathBuf::from("/etc/reaper/kubeconfig")),
                context: None
            }
        );
    }

    #[test]
    fn test_file_config_rejects_unknown_keys() {
        assert!(FileConfig::from_yaml("rulez: []").is_err());
        assert!(FileConfig::from_yaml("auth:\n  mode: token\n").is_err());
    }

    #[test]
    fn test_file_rule_needs_one_message_matcher() {
        let both = FileConfig::from_yaml(
            "rules:\n  - name: r\n    message: a\n    message_regex: b\n",
        )
        .unwrap();
        let cli = parse(&[]);
        assert!(Settings::resolve(&cli, both).is_err());

        let neither = FileConfig::from_yaml("rules:\n  - name: r\n    reason: Failed\n").unwrap();
        assert!(Settings::resolve(&cli, neither).is_err());

        let empty_regex =
            FileConfig::from_yaml("rules:\n  - name: r\n    message_regex: ''\n").unwrap();
        assert!(Settings::resolve(&cli, empty_regex).is_err());
    }
}

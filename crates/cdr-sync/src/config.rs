//! Process configuration, built once at startup and passed down by reference.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use cdr_queue::QueueConfig;
use cdr_storage::StoreConfig;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub queue: QueueConfig,
}

impl AppConfig {
    /// Defaults, then the optional YAML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// `CDR_*` names win; the unprefixed names older deployments set are fallbacks.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        match lookup("CDR_DATABASE_URL").or_else(|| lookup("DATABASE_URL")) {
            Some(url) => self.store.database_url = url,
            None => self.apply_postgres_parts(&lookup),
        }
        override_parsed(&lookup, "CDR_DB_MAX_CONNECTIONS", &mut self.store.max_connections);

        if let Some(dir) = lookup("CDR_QUEUE_DIR") {
            self.queue.queue_dir = dir.into();
        }
        if let Some(topic) = lookup("CDR_INPUT_TOPIC").or_else(|| lookup("topic")) {
            self.queue.input_topic = topic;
        }
        if let Some(topic) = lookup("CDR_OUTPUT_TOPIC") {
            self.queue.output_topic = topic;
        }
        if let Some(topic) = lookup("CDR_DEAD_LETTER_TOPIC") {
            self.queue.dead_letter_topic = (!topic.trim().is_empty()).then_some(topic);
        }
        if let Some(group) = lookup("CDR_GROUP_ID").or_else(|| lookup("groupID")) {
            self.queue.group_id = group;
        }
        if let Some(follow) = lookup("CDR_FOLLOW") {
            self.queue.follow = matches!(follow.as_str(), "1" | "true" | "TRUE" | "True");
        }
        override_parsed(&lookup, "CDR_POLL_INTERVAL_MS", &mut self.queue.poll_interval_ms);
    }

    fn apply_postgres_parts(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        let store = &mut self.store;
        if let Some(host) = lookup("postgresHost") {
            store.host = Some(host);
        }
        if let Some(raw) = lookup("postgresPort") {
            match raw.trim().parse() {
                Ok(port) => store.port = Some(port),
                Err(_) => warn!(key = "postgresPort", value = %raw, "ignoring unparseable override"),
            }
        }
        if let Some(user) = lookup("postgresUser") {
            store.user = Some(user);
        }
        if let Some(password) = lookup("postgresPassword") {
            store.password = Some(password);
        }
        if let Some(dbname) = lookup("postgresDBName") {
            store.dbname = Some(dbname);
        }
    }
}

fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!(key, value = %raw, "ignoring unparseable override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_queue_zero_topics() {
        let config = AppConfig::default();
        assert_eq!(config.queue.output_topic, "out-queue-0");
        assert_eq!(config.queue.group_id, "cdr-reconciler");
        assert!(config.queue.dead_letter_topic.is_none());
        assert_eq!(config.store.max_connections, 5);
    }

    #[test]
    fn yaml_file_fills_only_the_keys_it_names() {
        let config = AppConfig::from_yaml_str(
            r#"
store:
  database_url: postgres://file/db
queue:
  input_topic: crawl-docs
  dead_letter_topic: crawl-dlq
  follow: false
"#,
        )
        .expect("yaml");
        assert_eq!(config.store.database_url, "postgres://file/db");
        assert_eq!(config.store.max_connections, 5);
        assert_eq!(config.queue.input_topic, "crawl-docs");
        assert_eq!(config.queue.output_topic, "out-queue-0");
        assert_eq!(config.queue.dead_letter_topic.as_deref(), Some("crawl-dlq"));
        assert!(!config.queue.follow);
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = AppConfig::from_yaml_str("queue:\n  group_id: from-file\n").expect("yaml");
        config.apply_overrides(lookup_from(&[
            ("DATABASE_URL", "postgres://fallback"),
            ("CDR_GROUP_ID", "from-env"),
            ("CDR_QUEUE_DIR", "/var/spool/cdr"),
            ("CDR_FOLLOW", "0"),
            ("CDR_POLL_INTERVAL_MS", "25"),
        ]));
        assert_eq!(config.store.database_url, "postgres://fallback");
        assert_eq!(config.queue.group_id, "from-env");
        assert_eq!(config.queue.queue_dir, PathBuf::from("/var/spool/cdr"));
        assert!(!config.queue.follow);
        assert_eq!(config.queue.poll_interval_ms, 25);
    }

    #[test]
    fn prefixed_database_url_beats_generic_one() {
        let mut config = AppConfig::default();
        config.apply_overrides(lookup_from(&[
            ("DATABASE_URL", "postgres://generic"),
            ("CDR_DATABASE_URL", "postgres://specific"),
        ]));
        assert_eq!(config.store.database_url, "postgres://specific");
    }

    #[test]
    fn legacy_names_apply_when_prefixed_ones_are_absent() {
        let mut config = AppConfig::default();
        config.apply_overrides(lookup_from(&[
            ("postgresHost", "pg"),
            ("postgresPort", "5433"),
            ("postgresUser", "crawler"),
            ("postgresPassword", "p@ss/word"),
            ("postgresDBName", "docs"),
            ("topic", "in-queue-7"),
            ("groupID", "legacy-group"),
        ]));
        assert_eq!(config.store.host.as_deref(), Some("pg"));
        assert_eq!(config.store.port, Some(5433));
        assert_eq!(config.store.password.as_deref(), Some("p@ss/word"));
        assert_eq!(config.queue.input_topic, "in-queue-7");
        assert_eq!(config.queue.group_id, "legacy-group");

        let options = config.store.connect_options().expect("options");
        assert_eq!(options.get_host(), "pg");
        assert_eq!(options.get_username(), "crawler");
        assert_eq!(options.get_database(), Some("docs"));
    }

    #[test]
    fn prefixed_names_shadow_legacy_ones() {
        let mut config = AppConfig::default();
        config.apply_overrides(lookup_from(&[
            ("CDR_DATABASE_URL", "postgres://u@specific/db"),
            ("postgresHost", "ignored"),
            ("CDR_INPUT_TOPIC", "crawl-docs"),
            ("topic", "ignored"),
        ]));
        assert_eq!(config.store.database_url, "postgres://u@specific/db");
        assert!(config.store.host.is_none());
        assert_eq!(config.queue.input_topic, "crawl-docs");
    }

    #[test]
    fn unparseable_numbers_keep_previous_value() {
        let mut config = AppConfig::default();
        config.apply_overrides(lookup_from(&[
            ("CDR_DB_MAX_CONNECTIONS", "lots"),
            ("CDR_DEAD_LETTER_TOPIC", "  "),
        ]));
        assert_eq!(config.store.max_connections, 5);
        assert!(config.queue.dead_letter_topic.is_none());
    }
}

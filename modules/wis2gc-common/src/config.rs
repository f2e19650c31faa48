use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt_broker_host: String,
    pub mqtt_broker_port: u16,
    pub mqtt_pub_user: String,
    pub mqtt_pub_password: String,

    // Dedup/metric store
    pub gb_connection_string: Option<String>,
    pub cache_endpoint: String,

    // Work queue
    pub queue_name: String,

    // Object storage
    pub bucket_name: String,
    pub dest_bucket_region: String,

    pub dev_mode: bool,
    pub error_on_missing_source_link: bool,
    pub tmp_dir: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if a required var is missing.
    pub fn from_env() -> Self {
        Self {
            mqtt_broker_host: required_env("MQTT_BROKER_HOST"),
            mqtt_broker_port: env::var("MQTT_BROKER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8883),
            mqtt_pub_user: required_env("MQTT_PUB_USER"),
            mqtt_pub_password: required_env("MQTT_PUB_PASSWORD"),
            gb_connection_string: env::var("GB_CONNECTION_STRING").ok(),
            cache_endpoint: required_env("CACHE_ENDPOINT"),
            queue_name: env::var("QUEUE_NAME").unwrap_or_else(|_| "wis2-gc".to_string()),
            bucket_name: env::var("BUCKET_NAME")
                .or_else(|_| env::var("dest_bucket_name"))
                .unwrap_or_else(|_| {
                    panic!("BUCKET_NAME (or dest_bucket_name) environment variable is required")
                }),
            dest_bucket_region: env::var("dest_bucket_region")
                .unwrap_or_else(|_| "us-east-1".to_string()),
            dev_mode: is_truthy(env::var("DEV-MODE").ok()),
            error_on_missing_source_link: is_truthy(
                env::var("ERROR_ON_MISSING_SOURCE_LINK").ok(),
            ),
            tmp_dir: env::var("TMP_DIR").unwrap_or_else(|_| "/tmp".to_string()),
        }
    }

    /// Log the presence/length of each sensitive env var, never the value.
    pub fn log_redacted(&self) {
        let vars = [
            ("MQTT_BROKER_HOST", &self.mqtt_broker_host),
            ("MQTT_PUB_USER", &self.mqtt_pub_user),
            ("MQTT_PUB_PASSWORD", &self.mqtt_pub_password),
            ("CACHE_ENDPOINT", &self.cache_endpoint),
            ("BUCKET_NAME", &self.bucket_name),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn is_truthy(v: Option<String>) -> bool {
    matches!(v.as_deref(), Some("True") | Some("true") | Some("1"))
}

use std::path::Path;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::AppError;

pub const LOG_ENV: &str = "GOHOUBI_LOG";
pub const DEFAULT_FILTER: &str = "gohoubi=info,sqlx=warn";
const LOG_FILE_PREFIX: &str = "gohoubi.log";

/// Install the global subscriber: JSON lines on stdout plus, when `log_dir`
/// is given, a daily rolling file. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stdout = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .try_init();

    if let Some(dir) = log_dir {
        info!(target: "gohoubi", event = "file_logging_enabled", dir = %dir.display());
    }
    guard
}

fn context_to_json(err: &AppError) -> Value {
    let mut map = Map::new();
    map.insert("code".into(), Value::String(err.code().to_string()));
    map.insert("message".into(), Value::String(err.message().to_string()));
    if !err.context().is_empty() {
        let context: Map<String, Value> = err
            .context()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        map.insert("context".into(), Value::Object(context));
    }
    if let Some(cause) = err.cause() {
        map.insert("cause".into(), Value::String(cause.to_string()));
    }
    Value::Object(map)
}

/// Structured log bracket around one inbound message.
pub struct MessageScope {
    chat_user_id: String,
    household_id: Option<String>,
    intent: &'static str,
    start: Instant,
}

impl MessageScope {
    pub fn new(chat_user_id: &str) -> Self {
        let scope = Self {
            chat_user_id: chat_user_id.to_string(),
            household_id: None,
            intent: "unclassified",
            start: Instant::now(),
        };
        debug!(
            target: "gohoubi",
            event = "message_enter",
            chat_user_id = %scope.chat_user_id
        );
        scope
    }

    pub fn set_household(&mut self, household_id: &str) {
        self.household_id = Some(household_id.to_string());
    }

    pub fn set_intent(&mut self, intent: &'static str) {
        self.intent = intent;
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn success(&self, reply: &'static str) {
        info!(
            target: "gohoubi",
            event = "message_handled",
            chat_user_id = %self.chat_user_id,
            household_id = self.household_id.as_deref(),
            intent = self.intent,
            reply,
            duration_ms = self.elapsed_ms()
        );
    }

    pub fn warn(&self, details: Value) {
        warn!(
            target: "gohoubi",
            event = "message_warning",
            chat_user_id = %self.chat_user_id,
            household_id = self.household_id.as_deref(),
            intent = self.intent,
            duration_ms = self.elapsed_ms(),
            details = %details
        );
    }

    pub fn fail(&self, err: &AppError) {
        error!(
            target: "gohoubi",
            event = "message_failed",
            chat_user_id = %self.chat_user_id,
            household_id = self.household_id.as_deref(),
            intent = self.intent,
            duration_ms = self.elapsed_ms(),
            details = %context_to_json(err)
        );
    }
}

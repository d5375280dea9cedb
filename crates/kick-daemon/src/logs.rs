use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const MAX_RECENT_LOGS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub time: String,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Most recent WARN/ERROR lines, oldest dropped first.
#[derive(Clone, Default)]
pub struct RecentLogs {
    inner: Arc<Mutex<VecDeque<LogLine>>>,
}

impl RecentLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: LogLine) {
        if let Ok(mut buf) = self.inner.lock() {
            if buf.len() == MAX_RECENT_LOGS {
                buf.pop_front();
            }
            buf.push_back(line);
        }
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.inner
            .lock()
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Tracing layer feeding [`RecentLogs`].
pub struct RecentLogLayer {
    logs: RecentLogs,
}

impl RecentLogLayer {
    pub fn new(logs: RecentLogs) -> Self {
        Self { logs }
    }
}

impl<S> tracing_subscriber::Layer<S> for RecentLogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = String::new();
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        self.logs.push(LogLine {
            time: chrono::Utc::now().to_rfc3339(),
            level: level.to_string(),
            target: event.metadata().target().to_string(),
            message,
        });
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn keeps_only_warnings_and_caps_size() {
        let logs = RecentLogs::new();
        let subscriber = tracing_subscriber::registry().with(RecentLogLayer::new(logs.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("ignored");
            for i in 0..(MAX_RECENT_LOGS + 5) {
                tracing::warn!("warning {}", i);
            }
            tracing::error!(channel = "SXB", "boom");
        });

        let lines = logs.snapshot();
        assert_eq!(lines.len(), MAX_RECENT_LOGS);
        assert_eq!(lines[0].message, "warning 6");
        let last = lines.last().unwrap();
        assert_eq!(last.level, "ERROR");
        assert!(last.message.contains("boom"));
        assert!(last.message.contains("channel=\"SXB\""));
    }
}

//! Provide tracing, tailored to the supervisor.
//!
//! At startup, `main` calls [`init_journald_or_stdout`] to install a tracing
//! subscriber. The rest of the program uses `crate::tracing::prelude::*` for
//! the `trace!()`, `debug!()`, `info!()`, `warn!()`, and `error!()` macros.
//!
//! Boot stages, services and pipeline workers run inside spans named
//! `stage`, `service` and `worker`. The stdout formatter prints the
//! innermost of these in the line header, so every event says which part of
//! the boot produced it.

use std::env;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime, FmtContext, FormatEvent, FormatFields, FormattedFields},
    prelude::*,
    registry::LookupSpan,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

const CRATE_PREFIX: &str = "bitaxe_supervisor::";

/// Span names whose first field labels a log line.
const CONTEXT_SPANS: &[&str] = &["stage", "service", "worker"];

/// Initialize logging.
///
/// If running under systemd, use journald; otherwise fall back to stdout.
pub fn init_journald_or_stdout() {
    if env::var("JOURNAL_STREAM").is_ok() {
        match tracing_journald::layer() {
            Ok(layer) => tracing_subscriber::registry()
                .with(default_filter())
                .with(layer.with_syslog_identifier("bitaxe-supervisor".into()))
                .init(),
            Err(e) => {
                use_stdout();
                error!(error = %e, "Failed to initialize journald logging, using stdout.");
            }
        }
    } else {
        use_stdout();
    }
}

// RUST_LOG filtering, INFO unless overridden.
fn default_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy()
}

fn use_stdout() {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
                .event_format(CompactFormatter),
        )
        .init();
}

/// Event formatter: `HH:MM:SS LEVEL target [context]: message`, with any
/// structured fields on an indented second line.
struct CompactFormatter;

#[derive(Default)]
struct FieldCollector {
    fields: Vec<(String, String)>,
    message: Option<String>,
}

impl tracing::field::Visit for FieldCollector {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let formatted = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(formatted);
        } else {
            self.fields.push((field.name().to_string(), unwrap_some(formatted)));
        }
    }
}

// Some("foo") -> foo
fn unwrap_some(formatted: String) -> String {
    match formatted
        .strip_prefix("Some(")
        .and_then(|inner| inner.strip_suffix(')'))
    {
        Some(inner) => inner.to_string(),
        None => formatted,
    }
}

fn short_target<'a>(target: &'a str, fields: &'a [(String, String)]) -> &'a str {
    if let Some(stripped) = target.strip_prefix(CRATE_PREFIX) {
        stripped
    } else if target == "log" {
        fields
            .iter()
            .find(|(k, _)| k == "log.target")
            .map(|(_, v)| v.as_str())
            .unwrap_or(target)
    } else {
        target
    }
}

/// Value of the first field in a span's formatted fields, e.g. `bringup`
/// from `stage=bringup` or `asic result` from `name="asic result"`.
fn first_field_value(formatted: &str) -> Option<&str> {
    let (_, rest) = formatted.split_once('=')?;
    let value = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or(quoted),
        None => rest.split_whitespace().next().unwrap_or(rest),
    };
    Some(value)
}

impl<S, N> FormatEvent<S, N> for CompactFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        LocalTimer.format_time(&mut writer)?;

        let (color, label) = match *event.metadata().level() {
            tracing::Level::ERROR => ("\x1b[31m", "ERROR"),
            tracing::Level::WARN => ("\x1b[33m", "WARN "),
            tracing::Level::INFO => ("\x1b[32m", "INFO "),
            tracing::Level::DEBUG => ("\x1b[34m", "DEBUG"),
            tracing::Level::TRACE => ("\x1b[35m", "TRACE"),
        };
        write!(writer, " {}{}\x1b[0m ", color, label)?;
        write!(
            writer,
            "{}",
            short_target(event.metadata().target(), &visitor.fields)
        )?;

        // Innermost stage/service/worker span.
        let context = ctx.event_scope().and_then(|scope| {
            scope
                .filter(|span| CONTEXT_SPANS.contains(&span.name()))
                .find_map(|span| {
                    let extensions = span.extensions();
                    let value = extensions
                        .get::<FormattedFields<N>>()
                        .and_then(|formatted| first_field_value(&formatted.fields))
                        .map(str::to_string);
                    value
                })
        });
        if let Some(context) = context {
            write!(writer, " \x1b[36m[{}]\x1b[0m", context)?;
        }
        write!(writer, ": ")?;

        if let Some(msg) = &visitor.message {
            write!(writer, "{}", msg.trim_matches('"'))?;
        }

        let mut fields = visitor
            .fields
            .iter()
            .filter(|(k, _)| !k.starts_with("log."))
            .peekable();
        if fields.peek().is_some() {
            // Timestamp (8) + space + level (5) + space.
            write!(writer, "\n\x1b[90m               ")?;
            for (i, (key, value)) in fields.enumerate() {
                if i > 0 {
                    write!(writer, ", ")?;
                }
                write!(writer, "{}={}", key, value.trim_matches('"'))?;
            }
            write!(writer, "\x1b[0m")?;
        }

        writeln!(writer)
    }
}

/// Local wall-clock time to the second.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let formatted = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{}", formatted)
    }
}

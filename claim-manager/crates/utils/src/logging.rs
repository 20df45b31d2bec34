use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::Utc;
use color_eyre::eyre::eyre;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Span field shown in its own column by the pretty formatter.
const CATEGORY_FIELD: &str = "category";

/// Fields recorded on the spans an event is emitted in.
#[derive(Debug, Clone, Default)]
pub struct SpanFields(BTreeMap<String, String>);

impl SpanFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl Visit for SpanFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value).trim_matches('"').to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

/// Stores span fields in the span extensions so the formatters can read them back.
pub struct SpanFieldLayer;

impl<S> Layer<S> for SpanFieldLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &tracing::span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut fields = SpanFields::default();
        attrs.record(&mut fields);
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &tracing::span::Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        let mut fields = extensions.remove::<SpanFields>().unwrap_or_default();
        values.record(&mut fields);
        extensions.insert(fields);
    }
}

/// Collects every span field from the root down to the current span. Inner spans win.
fn collect_span_fields<S, N>(ctx: &FmtContext<'_, S, N>) -> SpanFields
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    let mut all = SpanFields::default();
    if let Some(scope) = ctx.event_scope() {
        for span in scope.from_root() {
            if let Some(fields) = span.extensions().get::<SpanFields>() {
                all.0.extend(fields.0.clone());
            }
        }
    }
    all
}

#[derive(Default)]
struct EventFields {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let value = format!("{:?}", value).trim_matches('"').to_string();
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

// Pretty formatter is formatted for console readability
pub struct PrettyFormatter;

impl<S, N> FormatEvent<S, N> for PrettyFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();
        let now = Utc::now().format("%y-%m-%d %H:%M:%S").to_string();

        let ts_color = "\x1b[96m";
        let level_color = match *meta.level() {
            Level::TRACE => "\x1b[90m",
            Level::DEBUG => "\x1b[34m",
            Level::INFO => "\x1b[32m",
            Level::WARN => "\x1b[33m",
            Level::ERROR => "\x1b[31m",
        };
        let category_color = "\x1b[92m";
        let field_color = "\x1b[90m";
        let reset = "\x1b[0m";

        let span_fields = collect_span_fields(ctx);
        let mut visitor = EventFields::default();
        event.record(&mut visitor);

        // Category comes from the event first, then from the enclosing spans.
        let category = visitor
            .fields
            .iter()
            .find(|(name, _)| name == CATEGORY_FIELD)
            .map(|(_, value)| value.as_str())
            .or_else(|| span_fields.get(CATEGORY_FIELD))
            .unwrap_or("-");

        write!(writer, "{ts_color}{now}{reset} {field_color}|{reset} ")?;
        write!(writer, "{level_color}{:<5}{reset} {field_color}|{reset} ", *meta.level())?;
        write!(writer, "{category_color}{:<10}{reset} {field_color}|{reset} ", category)?;
        write!(writer, "{}", visitor.message)?;

        let mut rendered = String::new();
        for (name, value) in visitor.fields.iter().filter(|(name, _)| name != CATEGORY_FIELD) {
            if !rendered.is_empty() {
                rendered.push_str(", ");
            }
            let _ = write!(rendered, "{name}={value}");
        }
        if !rendered.is_empty() {
            write!(writer, " {field_color}({rendered}){reset}")?;
        }

        writeln!(writer)
    }
}

// JSON formatter for structured logs, one object per line
pub struct JsonEventFormatter;

impl<S, N> FormatEvent<S, N> for JsonEventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();
        let ts = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let mut visitor = EventFields::default();
        event.record(&mut visitor);

        let mut root = Map::new();
        root.insert("timestamp".to_string(), Value::String(ts));
        root.insert("level".to_string(), Value::String(meta.level().to_string()));
        root.insert("target".to_string(), Value::String(meta.target().to_string()));
        if let Some(file) = meta.file() {
            root.insert("filename".to_string(), Value::String(file.to_string()));
        }
        if let Some(line) = meta.line() {
            root.insert("line_number".to_string(), Value::from(line));
        }
        root.insert("message".to_string(), Value::String(visitor.message));

        let mut fields: Map<String, Value> =
            collect_span_fields(ctx).0.into_iter().map(|(name, value)| (name, Value::String(value))).collect();
        for (name, value) in visitor.fields {
            fields.insert(name, Value::String(value));
        }
        if !fields.is_empty() {
            root.insert("fields".to_string(), Value::Object(fields));
        }

        let line = serde_json::to_string(&Value::Object(root)).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{}", line)
    }
}

/// Initialize the tracing subscriber with
/// - PrettyFormatter for console readability (when LOG_FORMAT != "json")
/// - JsonEventFormatter for json logging (when LOG_FORMAT = "json")
///
/// The filter is read from `RUST_LOG` and falls back to `info`. This also installs
/// color_eyre. Calling it a second time returns an error.
pub fn init_logging() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);
    let fmt_layer = if json {
        fmt_layer.event_format(JsonEventFormatter).boxed()
    } else {
        fmt_layer.event_format(PrettyFormatter).boxed()
    };

    let subscriber = Registry::default().with(env_filter).with(SpanFieldLayer).with(fmt_layer).with(ErrorLayer::default());
    tracing::subscriber::set_global_default(subscriber).map_err(|e| eyre!("Failed to set global subscriber: {e}"))
}

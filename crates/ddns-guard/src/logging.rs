//! Tracing subscriber setup: one filtered layer per `[[logs]]` output

use crate::config::{LogFormat, LogOutput, LogTarget};
use anyhow::Context as _;
use regex::Regex;
use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::{FmtContext, MakeWriter};
use tracing_subscriber::layer::{Context, Filter, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Used when `RUST_LOG` is unset: dependencies only surface warnings
const DEFAULT_DIRECTIVES: &str =
    "warn,ddns_guard=trace,watch_engine=trace,watch_plugins=trace,watch_expression=trace";

/// Span opened by the scheduler around every tick
const WATCHER_SPAN: &str = "watcher";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber
///
/// `RUST_LOG`, when set, replaces the per-crate defaults; each output's own
/// filters still apply.
pub fn init(outputs: &[LogOutput]) -> anyhow::Result<()> {
    let targets = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(DEFAULT_DIRECTIVES)?,
    };

    let layers = outputs
        .iter()
        .enumerate()
        .map(|(i, output)| {
            let writer = make_writer(&output.target()).with_context(|| format!("logs[{i}]"))?;
            layer(output, writer).with_context(|| format!("logs[{i}]"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    tracing_subscriber::registry()
        .with(layers)
        .with(targets)
        .try_init()?;
    Ok(())
}

fn make_writer(target: &LogTarget) -> anyhow::Result<BoxMakeWriter> {
    Ok(match target {
        LogTarget::Std => BoxMakeWriter::new(
            std::io::stderr
                .with_max_level(Level::WARN)
                .or_else(std::io::stdout),
        ),
        LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    })
}

/// Build the filtered layer for `output`, writing to `writer`
fn layer<W>(output: &LogOutput, writer: W) -> anyhow::Result<BoxedLayer>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = OutputFilter::new(output)?;
    let layer = match output.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .event_format(TemplateFormat::new(output)?)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_timer(ChronoLocal::new(output.date_format.clone()))
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    };
    Ok(layer)
}

/// Watcher name recorded on the tick span
struct WatcherName(String);

/// Captures one named field as text
struct FieldText {
    name: &'static str,
    value: Option<String>,
}

impl FieldText {
    fn new(name: &'static str) -> Self {
        Self { name, value: None }
    }
}

impl Visit for FieldText {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == self.name {
            self.value = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == self.name {
            self.value = Some(format!("{value:?}"));
        }
    }
}

fn watcher_name<'a, S>(scope: Option<tracing_subscriber::registry::Scope<'a, S>>) -> Option<String>
where
    S: for<'l> LookupSpan<'l>,
{
    scope?.find_map(|span| {
        let extensions = span.extensions();
        extensions.get::<WatcherName>().map(|n| n.0.clone())
    })
}

/// Per-output level, level-set, watcher-name and message filters
pub struct OutputFilter {
    level: LevelFilter,
    levels: Vec<Level>,
    names: Vec<String>,
    messages: Vec<Regex>,
}

impl OutputFilter {
    pub fn new(output: &LogOutput) -> anyhow::Result<Self> {
        Ok(Self {
            level: output.level_filter()?,
            levels: output.levels()?,
            names: output.name_filters.clone(),
            messages: output.messages()?,
        })
    }

    fn level_enabled(&self, level: &Level) -> bool {
        self.level >= *level && (self.levels.is_empty() || self.levels.contains(level))
    }
}

impl<S> Filter<S> for OutputFilter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        // Spans carry the watcher name for the name filter
        meta.is_span() || self.level_enabled(meta.level())
    }

    fn event_enabled(&self, event: &Event<'_>, cx: &Context<'_, S>) -> bool {
        if !self.names.is_empty() {
            match watcher_name(cx.event_scope(event)) {
                Some(name) if self.names.contains(&name) => {}
                _ => return false,
            }
        }
        if !self.messages.is_empty() {
            let mut message = FieldText::new("message");
            event.record(&mut message);
            let message = message.value.unwrap_or_default();
            if !self.messages.iter().any(|re| re.is_match(&message)) {
                return false;
            }
        }
        true
    }

    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, cx: Context<'_, S>) {
        if attrs.metadata().name() != WATCHER_SPAN {
            return;
        }
        let Some(span) = cx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if extensions.get_mut::<WatcherName>().is_some() {
            return;
        }
        let mut name = FieldText::new("name");
        attrs.record(&mut name);
        if let Some(name) = name.value {
            extensions.insert(WatcherName(name));
        }
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        // The tick span must exist for the name filter to see it
        if self.names.is_empty() {
            Some(self.level)
        } else {
            None
        }
    }
}

/// Text line built from a template with `{asctime}`, `{levelname}`,
/// `{name}`, `{target}` and `{message}` placeholders
struct TemplateFormat {
    template: String,
    date_format: String,
    placeholder: Regex,
}

impl TemplateFormat {
    fn new(output: &LogOutput) -> anyhow::Result<Self> {
        Ok(Self {
            template: output.text_format.clone(),
            date_format: output.date_format.clone(),
            placeholder: Regex::new(r"\{(asctime|levelname|name|target|message)\}")?,
        })
    }
}

impl<S, N> FormatEvent<S, N> for TemplateFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut message = String::new();
        ctx.format_fields(format::Writer::new(&mut message), event)?;

        let meta = event.metadata();
        let line = self.placeholder.replace_all(&self.template, |caps: &regex::Captures<'_>| {
            match &caps[1] {
                "asctime" => chrono::Local::now().format(&self.date_format).to_string(),
                "levelname" => meta.level().to_string(),
                "name" => watcher_name(ctx.event_scope())
                    .unwrap_or_else(|| meta.target().to_string()),
                "target" => meta.target().to_string(),
                _ => message.clone(),
            }
        });
        writeln!(writer, "{line}")
    }
}

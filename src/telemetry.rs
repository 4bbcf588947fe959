use tracing::{subscriber::set_global_default, Level, Subscriber};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{
    filter::Targets, fmt::MakeWriter, prelude::__tracing_subscriber_SubscriberExt,
    registry::LookupSpan, Registry,
};

/// Filter used unless a directive is configured: debug for `name`, warn for
/// everything else. An unparsable directive falls back to this too.
pub fn create_filter(name: &str, directive: Option<&str>) -> Targets {
    directive
        .and_then(|directive| directive.parse::<Targets>().ok())
        .unwrap_or_else(|| {
            Targets::new()
                .with_target(name, Level::DEBUG)
                .with_default(Level::WARN)
        })
}

/// Setup telemetry and output it to a given sink.
pub fn create_subscriber<Sink>(
    name: String,
    directive: Option<&str>,
    sink: Sink,
) -> impl Subscriber + Send + Sync + for<'span> LookupSpan<'span>
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = create_filter(&name, directive);
    let formatting_layer = BunyanFormattingLayer::new(name, sink);

    Registry::default()
        .with(filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    set_global_default(subscriber).expect("Failed to setup log subscriber");
}

use sentry_tracing::EventFilter;
use tracing::Level;

/// Initialises Sentry when `SENTRY_DSN` is set. The returned guard flushes
/// pending events on drop, so the caller keeps it alive for the process
/// lifetime.
pub fn init_once(release: &'static str) -> Option<::sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|d| !d.trim().is_empty())?;

    let guard = ::sentry::init((
        dsn,
        ::sentry::ClientOptions {
            release: Some(release.into()),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));
    Some(guard)
}

/// Errors become Sentry events, warnings breadcrumbs. Without an initialised
/// client the layer is inert.
pub fn sentry_layer<S>() -> sentry_tracing::SentryLayer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
        Level::ERROR => EventFilter::Event,
        Level::WARN => EventFilter::Breadcrumb,
        _ => EventFilter::Ignore,
    })
}

//! Statsd metrics for CMS traffic.
//!
//! Metrics are emitted with the [`metric!`](crate::metric) macro. Until a client is
//! configured with [`configure_statsd`] or [`configure_sink`], the macro does nothing.
use std::collections::BTreeMap;
use std::net::{ToSocketAddrs, UdpSocket};
use std::panic::RefUnwindSafe;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use cadence::{Metric, MetricBuilder, MetricSink, StatsdClient, UdpMetricSink};

static METRICS_CLIENT: OnceLock<MetricsClient> = OnceLock::new();

/// Traits needed by the [`metric!`](crate::metric) macro.
pub mod prelude {
    pub use cadence::prelude::*;
}

/// A statsd client that adds the configured custom tags to every metric.
#[derive(Debug)]
pub struct MetricsClient {
    statsd: StatsdClient,
    tags: BTreeMap<String, String>,
}

impl MetricsClient {
    /// The underlying statsd client, used to build metrics.
    pub fn statsd(&self) -> &StatsdClient {
        &self.statsd
    }

    #[inline(always)]
    pub fn send_metric<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        for (tag, value) in &self.tags {
            metric = metric.with_tag(tag, value);
        }
        metric.send()
    }
}

/// Reports metrics to the statsd server at `host`.
pub fn configure_statsd<A: ToSocketAddrs>(
    prefix: &str,
    host: A,
    tags: BTreeMap<String, String>,
) -> Result<()> {
    let addrs: Vec<_> = host
        .to_socket_addrs()
        .context("failed to resolve statsd host")?
        .collect();
    let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind statsd socket")?;
    socket.set_nonblocking(true)?;
    let sink = UdpMetricSink::from(&addrs[..], socket)?;

    if let Some(addr) = addrs.first() {
        tracing::info!("Reporting metrics to statsd at {}", addr);
    }
    configure_sink(prefix, sink, tags);
    Ok(())
}

/// Reports metrics to an arbitrary sink.
///
/// Metrics can only be configured once per process. Later calls log a warning and are ignored.
pub fn configure_sink<S>(prefix: &str, sink: S, tags: BTreeMap<String, String>)
where
    S: MetricSink + Send + Sync + RefUnwindSafe + 'static,
{
    let client = MetricsClient {
        statsd: StatsdClient::from_sink(prefix, sink),
        tags,
    };
    if METRICS_CLIENT.set(client).is_err() {
        tracing::warn!("metrics were already configured");
    }
}

/// Calls `f` with the configured client, or returns the default if there is none.
#[inline(always)]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    METRICS_CLIENT.get().map(f).unwrap_or_default()
}

/// Emits a counter or timer metric with optional `"tag" => value` pairs.
#[macro_export]
macro_rules! metric {
    (counter($id:expr) += $value:expr $(, $k:expr => $v:expr)* $(,)?) => {{
        use $crate::metrics::prelude::*;
        $crate::metrics::with_client(|client| {
            client.send_metric(
                client.statsd().count_with_tags($id, $value)
                    $(.with_tag($k, $v))*
            );
        })
    }};

    (timer($id:expr) = $value:expr $(, $k:expr => $v:expr)* $(,)?) => {{
        use $crate::metrics::prelude::*;
        $crate::metrics::with_client(|client| {
            client.send_metric(
                client.statsd().time_with_tags($id, $value)
                    $(.with_tag($k, $v))*
            );
        })
    }};
}

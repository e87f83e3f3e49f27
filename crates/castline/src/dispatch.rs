//! The per-connection receive task.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use castline_assembly::{FragmentAssembler, Progress};
use castline_protocol::{Packet, decode};
use castline_registry::SubscriptionRegistry;
use castline_transport::{Datagram, DatagramTransport};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, trace, warn};

/// Floor for the sweep timer; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Pause after a failed receive, doubled per consecutive failure up to
/// [`MAX_RECEIVE_BACKOFF`].
const RECEIVE_BACKOFF: Duration = Duration::from_millis(10);
const MAX_RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

/// Receives, decodes and dispatches until the transport closes.
///
/// This task is the only place listeners run, and the only owner of the
/// assembler.
pub(crate) async fn run<T: DatagramTransport>(
    transport: Arc<T>,
    registry: Arc<SubscriptionRegistry>,
    mut assembler: FragmentAssembler,
    sweep_interval: Duration,
) {
    let mut sweep = interval(sweep_interval.max(MIN_SWEEP_INTERVAL));
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut backoff = RECEIVE_BACKOFF;

    loop {
        tokio::select! {
            received = transport.next_datagram() => match received {
                Ok(Some(datagram)) => {
                    backoff = RECEIVE_BACKOFF;
                    handle_datagram(&registry, &mut assembler, datagram);
                }
                Ok(None) => break,
                Err(e) => {
                    if transport.is_closed() {
                        break;
                    }
                    warn!(error = %e, retry_in = ?backoff, "receive failed");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RECEIVE_BACKOFF);
                }
            },
            _ = sweep.tick() => {
                assembler.purge_expired();
            }
        }
    }

    debug!(pending = assembler.pending_count(), "receive loop stopped");
}

pub(crate) fn handle_datagram(
    registry: &SubscriptionRegistry,
    assembler: &mut FragmentAssembler,
    datagram: Datagram,
) {
    let Datagram { payload, source } = datagram;
    match decode(&payload) {
        Ok(Packet::Short(message)) => {
            trace!(%source, sequence = message.sequence, "short message");
            deliver(registry, &message.channel, &message.payload);
        }
        Ok(Packet::Fragment(fragment)) => match assembler.accept(source, fragment) {
            Ok(Progress::Complete(message)) => {
                trace!(%source, sequence = message.sequence, "reassembled message");
                deliver(registry, &message.channel, &message.payload);
            }
            Ok(Progress::Pending | Progress::AlreadyDelivered) => {}
            Err(e) => debug!(%source, error = %e, "discarding fragment"),
        },
        Err(e) => debug!(%source, len = payload.len(), error = %e, "discarding datagram"),
    }
}

/// Invokes every matching listener. A panicking listener is logged and
/// skipped.
fn deliver(registry: &SubscriptionRegistry, channel: &str, payload: &[u8]) {
    let listeners = registry.matching(channel);
    trace!(channel, size = payload.len(), listeners = listeners.len(), "dispatching");

    for listener in listeners {
        let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_message(channel, payload)));
        if let Err(panic) = outcome {
            warn!(channel, panic = %panic_message(&*panic), "listener panicked");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else {
        "non-string panic payload"
    }
}

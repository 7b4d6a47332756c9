// Session — owns one transport, one driver and (for cubes) the AES
// envelope, and pumps notifications into a typed event channel.
//
// All driver state is mutated from the session's notification task;
// command writes serialize against it through the driver lock. Event
// delivery is an unbounded channel: the cube tops out around twenty
// frames a second, so backpressure is a non-issue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::crypto::{key_pair_for_name, AesCbcEnvelope};
use crate::event::{Command, DeviceEvent};
use crate::protocol::{driver_for, Driver};
use crate::transport::{mac_to_salt, Generation, Transport};
use crate::ProtocolError;

/// An established connection to one device.
pub struct Session {
    device_name: String,
    device_mac: String,
    inner: Arc<SessionInner>,
    task: SyncMutex<Option<JoinHandle<()>>>,
    events: SyncMutex<Option<UnboundedReceiver<DeviceEvent>>>,
}

struct SessionInner {
    transport: Arc<dyn Transport>,
    driver: Mutex<Box<dyn Driver>>,
    envelope: Option<AesCbcEnvelope>,
    events_tx: SyncMutex<Option<UnboundedSender<DeviceEvent>>>,
    disconnected: AtomicBool,
    started_at: Instant,
}

impl Session {
    /// Connect to a device whose generation has been detected from its
    /// advertised GATT services. Derives the AES envelope from the device
    /// name and MAC address for the cube generations.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        generation: Generation,
        device_name: impl Into<String>,
        device_mac: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let device_name = device_name.into();
        let device_mac = device_mac.into();
        let envelope = if generation.encrypted() {
            let salt = mac_to_salt(&device_mac)?;
            Some(AesCbcEnvelope::new(&key_pair_for_name(&device_name), &salt))
        } else {
            None
        };
        Self::establish(
            transport,
            driver_for(generation),
            envelope,
            device_name,
            device_mac,
        )
        .await
    }

    /// Establish a session with an explicit driver and envelope. Exposed
    /// for tests and replay tooling.
    pub async fn establish(
        transport: Arc<dyn Transport>,
        driver: Box<dyn Driver>,
        envelope: Option<AesCbcEnvelope>,
        device_name: String,
        device_mac: String,
    ) -> Result<Self, ProtocolError> {
        let notifications = transport.notifications().await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            transport,
            driver: Mutex::new(driver),
            envelope,
            events_tx: SyncMutex::new(Some(events_tx)),
            disconnected: AtomicBool::new(false),
            started_at: Instant::now(),
        });

        tracing::info!(device = %device_name, "session established");
        let task = tokio::spawn(Self::run(Arc::clone(&inner), notifications));

        Ok(Self {
            device_name,
            device_mac,
            inner,
            task: SyncMutex::new(Some(task)),
            events: SyncMutex::new(Some(events_rx)),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn device_mac(&self) -> &str {
        &self.device_mac
    }

    /// Take the event stream. Yields `None` once, after the session has
    /// handed it out.
    pub fn events(&self) -> Option<UnboundedReceiver<DeviceEvent>> {
        self.events.lock().take()
    }

    /// Encode, encrypt and write a command. Commands without a wire form
    /// on this generation are silent no-ops.
    pub async fn send_command(&self, command: Command) -> Result<(), ProtocolError> {
        if self.inner.disconnected.load(Ordering::SeqCst) {
            return Err(ProtocolError::Disconnected);
        }
        self.inner.write_command(&command).await
    }

    /// Tear the session down: stop the notification pump, emit the final
    /// `Disconnect` event, close the event sink and drop the link.
    /// Idempotent.
    pub async fn disconnect(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        SessionInner::teardown(&self.inner).await;
    }

    async fn run(inner: Arc<SessionInner>, mut notifications: BoxStream<'static, Vec<u8>>) {
        while let Some(raw) = notifications.next().await {
            if inner.disconnected.load(Ordering::SeqCst) {
                break;
            }
            let now_ms = inner.started_at.elapsed().as_millis() as u64;
            let frame = match &inner.envelope {
                Some(envelope) => match envelope.decrypt(&raw) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::debug!(%err, len = raw.len(), "dropping undecryptable frame");
                        continue;
                    }
                },
                None => raw,
            };

            let output = inner.driver.lock().await.handle_state(&frame, now_ms);

            for command in output.commands {
                // History requests: a failed write retries off the next
                // move frame, so swallow the error.
                if let Err(err) = inner.write_command(&command).await {
                    tracing::debug!(%err, ?command, "deferred command write failed");
                }
            }
            for event in output.events {
                inner.emit(event);
            }
            if output.disconnect {
                tracing::warn!("driver requested disconnect");
                break;
            }
        }
        SessionInner::teardown(&inner).await;
    }
}

impl SessionInner {
    fn emit(&self, event: DeviceEvent) {
        if let Some(tx) = self.events_tx.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    async fn write_command(&self, command: &Command) -> Result<(), ProtocolError> {
        let Some(frame) = self.driver.lock().await.encode_command(command) else {
            return Ok(());
        };
        let frame = match &self.envelope {
            Some(envelope) => envelope.encrypt(&frame)?,
            None => frame,
        };
        self.transport.write(&frame).await?;
        Ok(())
    }

    async fn teardown(inner: &Arc<SessionInner>) {
        if inner.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("session closing");
        for event in inner.driver.lock().await.on_transport_disconnect() {
            inner.emit(event);
        }
        inner.emit(DeviceEvent::Disconnect);
        // Close the sink so consumers observe end-of-stream.
        inner.events_tx.lock().take();
        if let Err(err) = inner.transport.disconnect().await {
            tracing::debug!(%err, "transport disconnect reported an error");
        }
    }
}

//! Remote device registry abstraction.
//!
//! Defines capability traits for the external cloud device registry so the
//! bridge depends only on this interface, never on a concrete vendor client.
//! A test double lives in [`mock`].

use crate::error::BridgeResult;
use crate::model::{DeviceId, DeviceModel};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata presented to the remote registry at enrollment.
#[derive(Debug, Clone)]
pub struct EnrollmentMetadata {
    /// Human-readable device description.
    pub description: String,
    /// Manufacturer string.
    pub manufacturer: String,
}

impl Default for EnrollmentMetadata {
    fn default() -> Self {
        Self {
            description: "twinbridge connected device".to_string(),
            manufacturer: "twinbridge".to_string(),
        }
    }
}

/// An inbound event delivered by the device twin.
#[derive(Debug, Clone)]
pub enum TwinEvent {
    /// The remote side wrote an attribute.
    AttributeChange {
        /// Attribute name.
        attribute: String,
        /// New value.
        value: Value,
    },
    /// The remote side invoked an action.
    ActionInvoke {
        /// The alias the action was invoked under.
        alias: String,
        /// Invocation parameters.
        params: Value,
    },
    /// The remote side rejected a previously pushed value.
    ValidationError {
        /// The attribute values that were rejected.
        attempted: HashMap<String, Value>,
        /// Remote error message.
        message: String,
    },
}

/// The remote cloud device registry.
///
/// Wire format is out of scope here; implementations wrap whatever protocol
/// the registry speaks.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Verifies (or obtains) remote authorization for the given activation
    /// identity. Must succeed before any other call.
    async fn ensure_activated(&self, activation_id: &str) -> BridgeResult<()>;

    /// Fetches a device model by URN.
    async fn resolve_model(&self, urn: &str) -> BridgeResult<DeviceModel>;

    /// Enrolls a hardware identity against the given model URNs, returning
    /// the remote-issued device identity. Re-enrolling an existing hardware
    /// id returns the existing identity; both outcomes are success.
    async fn enroll(
        &self,
        hardware_id: &str,
        metadata: &EnrollmentMetadata,
        model_urns: &[String],
    ) -> BridgeResult<DeviceId>;

    /// Opens the virtual-device twin for an enrolled identity.
    async fn open_twin(
        &self,
        device_id: &DeviceId,
        model: &DeviceModel,
    ) -> BridgeResult<Arc<dyn DeviceTwin>>;
}

/// The virtual-device twin: one outbound update call plus an inbound event
/// stream.
#[async_trait]
pub trait DeviceTwin: Send + Sync {
    /// Pushes one batch of attribute values.
    async fn update(&self, attributes: HashMap<String, Value>) -> BridgeResult<()>;

    /// Receives the next inbound event.
    /// Returns `None` if the remote stream has shut down.
    async fn recv_event(&self) -> Option<TwinEvent>;
}

/// A mock device registry for testing.
pub mod mock {
    use super::*;
    use crate::error::BridgeError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// A scriptable in-memory device registry.
    pub struct MockDeviceRegistry {
        models: Mutex<HashMap<String, DeviceModel>>,
        device_id: DeviceId,
        twin: Arc<MockTwin>,
        fail_activation: AtomicBool,
        fail_enrollment: AtomicBool,
        enrolled: Mutex<Vec<String>>,
    }

    impl MockDeviceRegistry {
        /// Creates a registry that issues the given device id and serves
        /// events/updates through the given twin.
        pub fn new(device_id: impl Into<DeviceId>, twin: Arc<MockTwin>) -> Self {
            Self {
                models: Mutex::new(HashMap::new()),
                device_id: device_id.into(),
                twin,
                fail_activation: AtomicBool::new(false),
                fail_enrollment: AtomicBool::new(false),
                enrolled: Mutex::new(Vec::new()),
            }
        }

        /// Registers a resolvable model.
        pub fn add_model(&self, model: DeviceModel) {
            self.models.lock().unwrap().insert(model.urn.clone(), model);
        }

        /// Makes activation fail.
        pub fn fail_activation(&self, fail: bool) {
            self.fail_activation.store(fail, Ordering::SeqCst);
        }

        /// Makes enrollment fail.
        pub fn fail_enrollment(&self, fail: bool) {
            self.fail_enrollment.store(fail, Ordering::SeqCst);
        }

        /// Returns the hardware ids presented to `enroll`.
        pub fn enrolled_hardware_ids(&self) -> Vec<String> {
            self.enrolled.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeviceRegistry for MockDeviceRegistry {
        async fn ensure_activated(&self, activation_id: &str) -> BridgeResult<()> {
            if self.fail_activation.load(Ordering::SeqCst) {
                return Err(BridgeError::Resolution(format!(
                    "activation '{activation_id}' not authorized"
                )));
            }
            Ok(())
        }

        async fn resolve_model(&self, urn: &str) -> BridgeResult<DeviceModel> {
            self.models
                .lock()
                .unwrap()
                .get(urn)
                .cloned()
                .ok_or_else(|| BridgeError::Resolution(format!("unknown model urn: {urn}")))
        }

        async fn enroll(
            &self,
            hardware_id: &str,
            _metadata: &EnrollmentMetadata,
            _model_urns: &[String],
        ) -> BridgeResult<DeviceId> {
            if self.fail_enrollment.load(Ordering::SeqCst) {
                return Err(BridgeError::Enrollment(format!(
                    "registry rejected '{hardware_id}'"
                )));
            }
            self.enrolled.lock().unwrap().push(hardware_id.to_string());
            Ok(self.device_id.clone())
        }

        async fn open_twin(
            &self,
            _device_id: &DeviceId,
            _model: &DeviceModel,
        ) -> BridgeResult<Arc<dyn DeviceTwin>> {
            Ok(Arc::clone(&self.twin) as Arc<dyn DeviceTwin>)
        }
    }

    /// A mock twin that records update batches and injects inbound events.
    pub struct MockTwin {
        updates: Mutex<Vec<HashMap<String, Value>>>,
        event_tx: mpsc::Sender<TwinEvent>,
        event_rx: tokio::sync::Mutex<mpsc::Receiver<TwinEvent>>,
        fail_updates: AtomicBool,
        update_delay: Mutex<Option<Duration>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockTwin {
        /// Creates a twin with an event-injection channel.
        pub fn new() -> Arc<Self> {
            let (event_tx, event_rx) = mpsc::channel(32);
            Arc::new(Self {
                updates: Mutex::new(Vec::new()),
                event_tx,
                event_rx: tokio::sync::Mutex::new(event_rx),
                fail_updates: AtomicBool::new(false),
                update_delay: Mutex::new(None),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        /// Injects an inbound event, as if delivered by the remote side.
        pub async fn inject(&self, event: TwinEvent) {
            let _ = self.event_tx.send(event).await;
        }

        /// Makes update calls fail.
        pub fn fail_updates(&self, fail: bool) {
            self.fail_updates.store(fail, Ordering::SeqCst);
        }

        /// Delays every update call (for non-overlap tests).
        pub fn set_update_delay(&self, delay: Duration) {
            *self.update_delay.lock().unwrap() = Some(delay);
        }

        /// Returns all recorded update batches, in order.
        pub fn updates(&self) -> Vec<HashMap<String, Value>> {
            self.updates.lock().unwrap().clone()
        }

        /// Returns how many update batches were attempted.
        pub fn update_count(&self) -> usize {
            self.updates.lock().unwrap().len()
        }

        /// Returns the highest number of concurrently in-flight updates seen.
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeviceTwin for MockTwin {
        async fn update(&self, attributes: HashMap<String, Value>) -> BridgeResult<()> {
            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

            let delay = *self.update_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.updates.lock().unwrap().push(attributes);

            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(BridgeError::SyncIo("update failed".to_string()));
            }
            Ok(())
        }

        async fn recv_event(&self) -> Option<TwinEvent> {
            self.event_rx.lock().await.recv().await
        }
    }
}

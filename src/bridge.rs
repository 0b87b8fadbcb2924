//! Bridge lifecycle controller.
//!
//! Composes activation, model resolution, enrollment and the sync engine
//! into start/stop semantics for the host. The bridge is an outbound client
//! to the remote registry; it exposes no network port.

use crate::content::ContentCodec;
use crate::engine::SyncEngine;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{ResourceHandle, ResourceRegistry};
use crate::remote::{DeviceRegistry, EnrollmentMetadata};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Default outbound push period.
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for a bridge instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Stable local activation identity presented to the remote registry.
    pub activation_id: String,
    /// URN of the device model to resolve and enroll against.
    pub model_urn: String,
    /// Enrollment metadata sent to the remote registry.
    pub metadata: EnrollmentMetadata,
    /// Outbound push period.
    pub push_interval: Duration,
}

impl BridgeConfig {
    /// Creates a config with the default metadata and push interval.
    pub fn new(activation_id: impl Into<String>, model_urn: impl Into<String>) -> Self {
        Self {
            activation_id: activation_id.into(),
            model_urn: model_urn.into(),
            metadata: EnrollmentMetadata::default(),
            push_interval: DEFAULT_PUSH_INTERVAL,
        }
    }

    /// Sets the push interval.
    pub fn with_push_interval(mut self, interval: Duration) -> Self {
        self.push_interval = interval;
        self
    }
}

/// Lifecycle state of a bridge.
///
/// Transitions are strictly forward; a failed or stopped bridge cannot be
/// restarted in place — construct a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Constructed, not yet started.
    Unstarted,
    /// Verifying remote authorization.
    Activating,
    /// Resolving the device model.
    SchemaResolving,
    /// Enrolling the local identity.
    Enrolling,
    /// Steady-state sync loop running.
    Syncing,
    /// Gracefully stopped.
    Stopped,
    /// Startup failed.
    Failed,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BridgeState::Unstarted => "unstarted",
            BridgeState::Activating => "activating",
            BridgeState::SchemaResolving => "schema-resolving",
            BridgeState::Enrolling => "enrolling",
            BridgeState::Syncing => "syncing",
            BridgeState::Stopped => "stopped",
            BridgeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A device-twin sync bridge.
pub struct Bridge {
    config: BridgeConfig,
    registry: Arc<ResourceRegistry>,
    remote: Arc<dyn DeviceRegistry>,
    codec: Arc<dyn ContentCodec>,
    state: RwLock<BridgeState>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    /// Creates an unstarted bridge with an empty resource registry.
    pub fn new(
        config: BridgeConfig,
        remote: Arc<dyn DeviceRegistry>,
        codec: Arc<dyn ContentCodec>,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(ResourceRegistry::new()),
            remote,
            codec,
            state: RwLock::new(BridgeState::Unstarted),
            shutdown_tx: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Returns the current lifecycle state.
    pub async fn state(&self) -> BridgeState {
        *self.state.read().await
    }

    /// Returns the resource registry.
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Registers a resource. Returns `false` if the name is already taken.
    pub async fn add_resource(&self, name: impl Into<String>, handle: ResourceHandle) -> bool {
        self.registry.add(name, handle).await
    }

    /// Removes a resource. Returns `false` if the name was not present.
    pub async fn remove_resource(&self, name: &str) -> bool {
        self.registry.remove(name).await
    }

    /// Starts the bridge: activation, model resolution, enrollment, then the
    /// sync loop. Returns once the bridge is `Syncing`; any failure leaves
    /// the bridge `Failed` and carries the failing phase in the error.
    pub async fn start(&self) -> BridgeResult<()> {
        {
            let mut state = self.state.write().await;
            if *state != BridgeState::Unstarted {
                return Err(BridgeError::InvalidState {
                    expected: BridgeState::Unstarted,
                    actual: *state,
                });
            }
            *state = BridgeState::Activating;
        }
        info!("bridge starting with activation '{}'", self.config.activation_id);

        match self.start_inner().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("bridge startup failed: {e}");
                self.set_state(BridgeState::Failed).await;
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> BridgeResult<()> {
        self.remote
            .ensure_activated(&self.config.activation_id)
            .await?;

        self.set_state(BridgeState::SchemaResolving).await;
        let model = self.remote.resolve_model(&self.config.model_urn).await?;
        info!("resolved model '{}' ({})", model.name, model.urn);

        self.set_state(BridgeState::Enrolling).await;
        let hardware_id = format!("{}-{}", self.config.activation_id, model.name);
        info!("enrolling '{hardware_id}'");
        let device_id = self
            .remote
            .enroll(&hardware_id, &self.config.metadata, &[model.urn.clone()])
            .await?;
        info!("enrolled as device {device_id}");

        let twin = self.remote.open_twin(&device_id, &model).await?;
        let engine = Arc::new(
            SyncEngine::wire(
                device_id,
                model,
                Arc::clone(&self.registry),
                twin,
                Arc::clone(&self.codec),
                self.config.push_interval,
            )
            .await,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(engine.run(shutdown_rx));
        *self.shutdown_tx.lock().await = Some(shutdown_tx);
        *self.task.lock().await = Some(handle);

        self.set_state(BridgeState::Syncing).await;
        Ok(())
    }

    /// Stops the bridge: cancels the outbound timer and detaches the inbound
    /// listeners. An in-flight push or callback completes; no further tick
    /// fires after `stop` returns.
    pub async fn stop(&self) -> BridgeResult<()> {
        {
            let state = self.state.read().await;
            if *state != BridgeState::Syncing {
                return Err(BridgeError::InvalidState {
                    expected: BridgeState::Syncing,
                    actual: *state,
                });
            }
        }
        info!("bridge '{}' stopping", self.config.activation_id);

        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }

        self.set_state(BridgeState::Stopped).await;
        Ok(())
    }

    async fn set_state(&self, next: BridgeState) {
        let mut state = self.state.write().await;
        info!("bridge state: {} -> {next}", *state);
        *state = next;
    }
}

//! Sync engine — the bidirectional steady-state loop.
//!
//! Owns the outbound poll-push timer, the inbound change-apply and
//! action-dispatch paths, and validation-error reporting. All steady-state
//! failures are contained to the failing item: a bad read drops one property
//! from one batch, a bad send is retried by the next tick, a bad write or
//! invoke is logged and skipped.

use crate::content::ContentCodec;
use crate::model::{DeviceId, DeviceModel};
use crate::registry::ResourceRegistry;
use crate::remote::{DeviceTwin, TwinEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The sync engine for one enrolled identity.
pub struct SyncEngine {
    /// The enrolled device identity.
    device_id: DeviceId,
    /// The resolved model.
    model: DeviceModel,
    /// Locally exposed resources (shared with the host).
    registry: Arc<ResourceRegistry>,
    /// The remote twin.
    twin: Arc<dyn DeviceTwin>,
    /// Content codec for the handle boundary.
    codec: Arc<dyn ContentCodec>,
    /// Outbound push period.
    push_interval: Duration,
    /// Wired actions: remote alias → registry resource name.
    /// Computed once at sync start as the intersection of model actions and
    /// registered action handles; never updated afterwards.
    actions: HashMap<String, String>,
}

impl SyncEngine {
    /// Wires an engine for an enrolled identity.
    ///
    /// Action dispatch is enumerated here, once: a model action is wired
    /// only if the registry holds an action handle with a matching name.
    /// Registry actions absent from the model are never reachable from the
    /// remote side.
    pub async fn wire(
        device_id: DeviceId,
        model: DeviceModel,
        registry: Arc<ResourceRegistry>,
        twin: Arc<dyn DeviceTwin>,
        codec: Arc<dyn ContentCodec>,
        push_interval: Duration,
    ) -> Self {
        let mut actions = HashMap::new();
        for spec in &model.actions {
            if registry.action(&spec.name).await.is_some() {
                debug!("wiring action '{}' under alias '{}'", spec.name, spec.alias);
                actions.insert(spec.alias.clone(), spec.name.clone());
            } else {
                debug!(
                    "model action '{}' has no registered handle - skipping",
                    spec.name
                );
            }
        }

        Self {
            device_id,
            model,
            registry,
            twin,
            codec,
            push_interval,
            actions,
        }
    }

    /// Returns the enrolled device identity.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Returns the model the engine was wired against.
    pub fn model(&self) -> &DeviceModel {
        &self.model
    }

    /// Returns the wired remote aliases.
    pub fn wired_aliases(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    /// Runs the sync loop until `shutdown` is signalled or the remote event
    /// stream closes.
    ///
    /// Pushes are awaited inside the tick arm, so ticks never overlap; a
    /// tick that fires while a push is in flight is skipped, not queued.
    /// An in-flight push completes before a shutdown signal is observed.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.push_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("sync loop started for device {}", self.device_id);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!("sync loop for device {} shutting down", self.device_id);
                    break;
                }

                _ = ticker.tick() => {
                    self.push_once().await;
                }

                event = self.twin.recv_event() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            warn!("remote event stream closed for device {}", self.device_id);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Performs one outbound push: snapshot all readable properties and send
    /// them as a single batch. Send failures are logged; the next tick
    /// retries with a fresh snapshot.
    pub async fn push_once(&self) {
        let batch = self.collect_snapshot().await;
        debug!(
            "pushing {} attribute(s) for device {}",
            batch.len(),
            self.device_id
        );
        if let Err(e) = self.twin.update(batch).await {
            warn!("batch update failed for device {}: {e}", self.device_id);
        }
    }

    /// Builds a best-effort snapshot of all property values. A failing read
    /// or decode drops that property from this batch only.
    pub async fn collect_snapshot(&self) -> HashMap<String, Value> {
        let mut batch = HashMap::new();
        for (name, handle) in self.registry.properties().await {
            let content = match handle.read().await {
                Ok(content) => content,
                Err(e) => {
                    warn!("property read failed for '{name}': {e} - skipping this tick");
                    continue;
                }
            };
            match self.codec.decode(&content) {
                Ok(value) => {
                    batch.insert(name, value);
                }
                Err(e) => {
                    warn!("property decode failed for '{name}': {e} - skipping this tick");
                }
            }
        }
        batch
    }

    /// Applies one inbound event.
    pub async fn handle_event(&self, event: TwinEvent) {
        match event {
            TwinEvent::AttributeChange { attribute, value } => {
                self.apply_write(&attribute, &value).await;
            }
            TwinEvent::ActionInvoke { alias, params } => {
                self.dispatch_action(&alias, &params).await;
            }
            TwinEvent::ValidationError { attempted, message } => {
                // Observability only; no corrective action.
                warn!(
                    device = %self.device_id,
                    ?attempted,
                    "remote rejected pushed values: {message}"
                );
            }
        }
    }

    /// Writes an inbound attribute change to the matching property handle.
    /// Unknown attribute names are ignored: the remote model may be a
    /// superset of what is exposed locally. The new value is not echoed back
    /// before the next scheduled tick.
    async fn apply_write(&self, attribute: &str, value: &Value) {
        let Some(handle) = self.registry.property(attribute).await else {
            debug!("no property '{attribute}' registered - ignoring remote write");
            return;
        };

        let content = match self.codec.encode(value) {
            Ok(content) => content,
            Err(e) => {
                warn!("encode failed for remote write to '{attribute}': {e}");
                return;
            }
        };

        if let Err(e) = handle.write(content).await {
            warn!("property write failed for '{attribute}': {e}");
        }
    }

    /// Dispatches a remote invocation to the wired action handle.
    /// Fire-and-forget: no result value goes back to the remote side.
    async fn dispatch_action(&self, alias: &str, params: &Value) {
        let Some(name) = self.actions.get(alias) else {
            debug!("alias '{alias}' is not wired - ignoring remote invoke");
            return;
        };

        let Some(handle) = self.registry.action(name).await else {
            warn!("action '{name}' was unregistered after wiring - ignoring remote invoke");
            return;
        };

        let params = match self.codec.encode(params) {
            Ok(content) => content,
            Err(e) => {
                warn!("encode failed for invocation of '{name}': {e}");
                return;
            }
        };

        if let Err(e) = handle.invoke(params).await {
            warn!("action invoke failed for '{name}': {e}");
        }
    }
}

//! Device-twin sync bridge.
//!
//! Keeps a set of locally-exposed named resources (readable/writable
//! properties, invokable actions) consistent with a remote device-twin
//! representation hosted by an external cloud device registry.
//!
//! # Architecture
//!
//! - **Registry**: maps resource names to property/action handles. Populated
//!   by the host; the bridge only reads it.
//! - **Remote**: capability traits for the cloud device registry (model
//!   resolution, enrollment, twin updates, inbound events). Wire format is
//!   out of scope; implementations wrap whatever protocol the registry
//!   speaks.
//! - **Engine**: the steady-state loop — periodic batch pushes of property
//!   values, inbound write application, action dispatch, validation-error
//!   reporting.
//! - **Bridge**: lifecycle controller composing the above into start/stop.
//!
//! # Lifecycle
//!
//! 1. **Activate**: verify remote authorization for the activation identity
//! 2. **Resolve**: fetch the device model by URN
//! 3. **Enroll**: register `{activation_id}-{model.name}` and obtain a
//!    device identity
//! 4. **Sync**: run the bidirectional loop until [`Bridge::stop`]
//!
//! Startup failures reject `start()` and leave the bridge `Failed`.
//! Steady-state failures are contained to the failing item and visible only
//! through logs.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use twinbridge::{
//!     Bridge, BridgeConfig, JsonCodec, ResourceHandle,
//!     registry::mock::MockProperty,
//!     remote::mock::{MockDeviceRegistry, MockTwin},
//! };
//!
//! # async fn example() -> twinbridge::BridgeResult<()> {
//! let twin = MockTwin::new();
//! let remote = Arc::new(MockDeviceRegistry::new("dev-42", twin));
//!
//! let bridge = Bridge::new(
//!     BridgeConfig::new("store1", "urn:dev:wot:example:sensor"),
//!     remote,
//!     Arc::new(JsonCodec),
//! );
//! bridge
//!     .add_resource(
//!         "temp",
//!         ResourceHandle::Property(Arc::new(MockProperty::new(json!(21)))),
//!     )
//!     .await;
//! bridge.start().await?;
//! # Ok(())
//! # }
//! ```

mod bridge;
pub mod content;
mod engine;
mod error;
pub mod model;
pub mod registry;
pub mod remote;

pub use bridge::{Bridge, BridgeConfig, BridgeState, DEFAULT_PUSH_INTERVAL};
pub use content::{Content, ContentCodec, JsonCodec, MEDIA_TYPE_JSON};
pub use engine::SyncEngine;
pub use error::{BridgeError, BridgeResult};
pub use model::{ActionSpec, DeviceId, DeviceModel};
pub use registry::{ActionHandle, PropertyHandle, ResourceHandle, ResourceRegistry};
pub use remote::{DeviceRegistry, DeviceTwin, EnrollmentMetadata, TwinEvent};

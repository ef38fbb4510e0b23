//! Data-bundle delivery through a third-party VTU provider
//!
//! Provider response shapes are normalized to `DeliveryResult` inside each
//! adapter; nothing above `DeliveryGateway` sees provider field names.

pub mod error;
pub mod factory;
pub mod gateway;
pub mod provider;
pub mod providers;
pub mod types;

pub use error::{DeliveryError, DeliveryResultOf};
pub use factory::{build_delivery_provider, DeliveryConfig, DeliveryProviderKind};
pub use gateway::DeliveryGateway;
pub use provider::DataDeliveryProvider;
pub use types::{BalanceInfo, DeliveryRequest, DeliveryResult, StatusResult};

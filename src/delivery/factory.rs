use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::delivery::error::{DeliveryError, DeliveryResultOf};
use crate::delivery::gateway::DeliveryGateway;
use crate::delivery::provider::DataDeliveryProvider;
use crate::delivery::providers::{ClubKonnectProvider, HubnetProvider, VtPassProvider};
use crate::services::network_detector::Carrier;

pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;

/// Supported VTU providers, selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryProviderKind {
    Hubnet,
    VtPass,
    ClubKonnect,
}

impl DeliveryProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryProviderKind::Hubnet => "hubnet",
            DeliveryProviderKind::VtPass => "vtpass",
            DeliveryProviderKind::ClubKonnect => "clubkonnect",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            DeliveryProviderKind::Hubnet => "https://hubnet.com.gh/api",
            DeliveryProviderKind::VtPass => "https://vtpass.com/api",
            DeliveryProviderKind::ClubKonnect => "https://www.clubkonnect.com/api",
        }
    }

    /// Provider's code for a carrier
    pub fn network_code(&self, carrier: Carrier) -> &'static str {
        match (self, carrier) {
            (DeliveryProviderKind::Hubnet, Carrier::Mtn) => "mtn",
            (DeliveryProviderKind::Hubnet, Carrier::Telecel) => "vodafone",
            (DeliveryProviderKind::Hubnet, Carrier::AirtelTigo) => "airteltigo",
            (DeliveryProviderKind::VtPass, Carrier::Mtn) => "mtn-data",
            (DeliveryProviderKind::VtPass, Carrier::Telecel) => "vodafone-gh",
            (DeliveryProviderKind::VtPass, Carrier::AirtelTigo) => "airteltigo-gh",
            (DeliveryProviderKind::ClubKonnect, Carrier::Mtn) => "01",
            (DeliveryProviderKind::ClubKonnect, Carrier::Telecel) => "02",
            (DeliveryProviderKind::ClubKonnect, Carrier::AirtelTigo) => "03",
        }
    }
}

impl FromStr for DeliveryProviderKind {
    type Err = DeliveryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "hubnet" => Ok(DeliveryProviderKind::Hubnet),
            "vtpass" => Ok(DeliveryProviderKind::VtPass),
            "clubkonnect" => Ok(DeliveryProviderKind::ClubKonnect),
            other => Err(DeliveryError::Configuration(format!(
                "unsupported VTU provider: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub provider: DeliveryProviderKind,
    pub api_key: String,
    pub user_id: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub callback_url: Option<String>,
}

impl DeliveryConfig {
    pub fn from_env() -> DeliveryResultOf<Self> {
        let provider = env::var("VTU_PROVIDER")
            .unwrap_or_else(|_| "hubnet".to_string())
            .parse()?;

        Ok(Self {
            provider,
            api_key: env::var("VTU_API_KEY").unwrap_or_default(),
            user_id: env::var("VTU_USER_ID").ok().filter(|v| !v.is_empty()),
            base_url: env::var("VTU_API_URL").ok().filter(|v| !v.is_empty()),
            timeout_secs: env::var("VTU_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DELIVERY_TIMEOUT_SECS),
            callback_url: env::var("VTU_CALLBACK_URL").ok().filter(|v| !v.is_empty()),
        })
    }

    pub fn validate(&self) -> DeliveryResultOf<()> {
        if self.api_key.trim().is_empty() {
            return Err(DeliveryError::Configuration(
                "VTU_API_KEY is required".to_string(),
            ));
        }
        if matches!(
            self.provider,
            DeliveryProviderKind::VtPass | DeliveryProviderKind::ClubKonnect
        ) && self.user_id.is_none()
        {
            return Err(DeliveryError::Configuration(format!(
                "VTU_USER_ID is required for {}",
                self.provider.as_str()
            )));
        }
        if self.timeout_secs == 0 {
            return Err(DeliveryError::Configuration(
                "VTU_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn build_delivery_provider(
    config: &DeliveryConfig,
) -> DeliveryResultOf<Arc<dyn DataDeliveryProvider>> {
    config.validate()?;
    let provider: Arc<dyn DataDeliveryProvider> = match config.provider {
        DeliveryProviderKind::Hubnet => Arc::new(HubnetProvider::new(config)?),
        DeliveryProviderKind::VtPass => Arc::new(VtPassProvider::new(config)?),
        DeliveryProviderKind::ClubKonnect => Arc::new(ClubKonnectProvider::new(config)?),
    };
    Ok(provider)
}

impl DeliveryGateway {
    pub fn from_config(config: &DeliveryConfig) -> DeliveryResultOf<Self> {
        Ok(Self::new(build_delivery_provider(config)?, config.timeout()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: DeliveryProviderKind) -> DeliveryConfig {
        DeliveryConfig {
            provider,
            api_key: "key".to_string(),
            user_id: Some("user".to_string()),
            base_url: None,
            timeout_secs: 30,
            callback_url: None,
        }
    }

    #[test]
    fn parses_provider_names() {
        assert_eq!(
            "VTPass".parse::<DeliveryProviderKind>().unwrap(),
            DeliveryProviderKind::VtPass
        );
        assert!("mtnapi".parse::<DeliveryProviderKind>().is_err());
    }

    #[test]
    fn network_codes_per_provider() {
        assert_eq!(DeliveryProviderKind::Hubnet.network_code(Carrier::Telecel), "vodafone");
        assert_eq!(DeliveryProviderKind::VtPass.network_code(Carrier::Mtn), "mtn-data");
        assert_eq!(
            DeliveryProviderKind::ClubKonnect.network_code(Carrier::AirtelTigo),
            "03"
        );
    }

    #[test]
    fn vtpass_requires_user_id() {
        let mut cfg = config(DeliveryProviderKind::VtPass);
        cfg.user_id = None;
        assert!(cfg.validate().is_err());
        assert!(config(DeliveryProviderKind::Hubnet).validate().is_ok());
    }

    #[test]
    fn base_url_override_is_trimmed() {
        let mut cfg = config(DeliveryProviderKind::Hubnet);
        assert_eq!(cfg.base_url(), "https://hubnet.com.gh/api");
        cfg.base_url = Some("http://localhost:9000/".to_string());
        assert_eq!(cfg.base_url(), "http://localhost:9000");
    }

    #[test]
    fn builds_each_provider() {
        for kind in [
            DeliveryProviderKind::Hubnet,
            DeliveryProviderKind::VtPass,
            DeliveryProviderKind::ClubKonnect,
        ] {
            let provider = build_delivery_provider(&config(kind)).unwrap();
            assert_eq!(provider.kind(), kind);
        }
    }
}

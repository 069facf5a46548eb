use std::{str::FromStr, time::Duration};

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use utils::{
    config::ConfigExt,
    credential::Credential,
    evm_client::{signing::make_signer, EvmEndpoint},
};

use crate::{
    error::ConfigError,
    registrar::DEFAULT_REGISTRATION_GAS_PRICE,
    responder::RetryPolicy,
    subscriber::TaskFilter,
};

/// The fully parsed config struct we use in the application
/// this is built up from the ConfigBuilder which can load from multiple sources (in order of preference):
///
/// 1. cli args
/// 2. environment variables
/// 3. config file
///
/// Values without a sensible default stay `None` here and are checked in [`Config::operator_settings`]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// The log-level to use, in the format of [tracing directives](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives).
    /// Default is `["info"]`
    pub log_level: Vec<String>,
    pub rpc_endpoint: Option<String>,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u64>,
    /// Default is `21000`
    pub registration_gas_price: u64,
    pub service_manager_address: Option<String>,
    pub delegation_manager_address: Option<String>,
    pub credential: Option<Credential>,
    pub hd_index: Option<u32>,
    /// Default is empty, i.e. every task
    pub task_index_filter: Vec<u32>,
    pub skip_registration: bool,
    /// Default is `1`, raise it together with `halt_on_response_error = false` to retry and skip
    pub response_max_attempts: u32,
    /// Default is `500`
    pub response_retry_backoff_ms: u64,
    /// Default is `60`
    pub response_timeout_secs: u64,
    /// Default is `true`
    pub halt_on_response_error: bool,
    pub jaeger: Option<String>,
    pub prometheus: Option<String>,
    /// Default is `15`
    pub spam_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: vec!["info".to_string()],
            rpc_endpoint: None,
            gas_limit: None,
            gas_price: None,
            registration_gas_price: DEFAULT_REGISTRATION_GAS_PRICE as u64,
            service_manager_address: None,
            delegation_manager_address: None,
            credential: None,
            hd_index: None,
            task_index_filter: Vec::new(),
            skip_registration: false,
            response_max_attempts: 1,
            response_retry_backoff_ms: 500,
            response_timeout_secs: 60,
            halt_on_response_error: true,
            jaeger: None,
            prometheus: None,
            spam_interval_secs: 15,
        }
    }
}

impl ConfigExt for Config {
    fn log_levels(&self) -> impl Iterator<Item = &str> {
        self.log_level.iter().map(|s| s.as_str())
    }
}

/// Where to register, only present when registration isn't skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSettings {
    pub delegation_manager: Address,
    pub gas_price: u128,
}

/// Validated settings for running the operator
#[derive(Debug, Clone)]
pub struct OperatorSettings {
    pub endpoint: EvmEndpoint,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub service_manager: Address,
    pub signer: PrivateKeySigner,
    pub registration: Option<RegistrationSettings>,
    pub filter: TaskFilter,
    pub retry: RetryPolicy,
}

impl Config {
    /// Checks everything the operator needs, before any connection is made
    pub fn operator_settings(&self) -> Result<OperatorSettings, ConfigError> {
        let registration = if self.skip_registration {
            None
        } else {
            Some(RegistrationSettings {
                delegation_manager: parse_address(
                    "delegation_manager_address",
                    self.delegation_manager_address.as_deref(),
                )?,
                gas_price: self.registration_gas_price.into(),
            })
        };

        if self.response_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "response_max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.response_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "response_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(OperatorSettings {
            endpoint: self.endpoint()?,
            gas_limit: self.gas_limit()?,
            gas_price: self.gas_price()?,
            service_manager: self.service_manager()?,
            signer: self.signer()?,
            registration,
            filter: TaskFilter::indices(self.task_index_filter.iter().copied()),
            retry: RetryPolicy {
                max_attempts: self.response_max_attempts,
                initial_backoff: Duration::from_millis(self.response_retry_backoff_ms),
                max_backoff: RetryPolicy::MAX_BACKOFF,
                attempt_timeout: Duration::from_secs(self.response_timeout_secs),
                halt_on_error: self.halt_on_response_error,
            },
        })
    }

    pub fn endpoint(&self) -> Result<EvmEndpoint, ConfigError> {
        let endpoint = self
            .rpc_endpoint
            .as_deref()
            .ok_or(ConfigError::Missing("rpc_endpoint"))?;

        EvmEndpoint::from_str(endpoint).map_err(|e| ConfigError::Invalid {
            field: "rpc_endpoint",
            reason: e.to_string(),
        })
    }

    pub fn gas_limit(&self) -> Result<u64, ConfigError> {
        match self.gas_limit {
            None => Err(ConfigError::Missing("gas_limit")),
            Some(0) => Err(ConfigError::Invalid {
                field: "gas_limit",
                reason: "must be greater than zero".to_string(),
            }),
            Some(gas_limit) => Ok(gas_limit),
        }
    }

    pub fn gas_price(&self) -> Result<u128, ConfigError> {
        self.gas_price
            .map(u128::from)
            .ok_or(ConfigError::Missing("gas_price"))
    }

    pub fn service_manager(&self) -> Result<Address, ConfigError> {
        parse_address(
            "service_manager_address",
            self.service_manager_address.as_deref(),
        )
    }

    pub fn signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or(ConfigError::Missing("credential"))?;

        make_signer(credential, self.hd_index).map_err(ConfigError::Credential)
    }

    pub fn spam_interval(&self) -> Duration {
        Duration::from_secs(self.spam_interval_secs)
    }
}

fn parse_address(field: &'static str, value: Option<&str>) -> Result<Address, ConfigError> {
    let value = value.ok_or(ConfigError::Missing(field))?;

    Address::from_str(value.trim()).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const ANVIL_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn complete() -> Config {
        Config {
            rpc_endpoint: Some("127.0.0.1:8546".to_string()),
            gas_limit: Some(1_000_000),
            gas_price: Some(20),
            service_manager_address: Some("0x0000000000000000000000000000000000000001".to_string()),
            delegation_manager_address: Some(
                "0x0000000000000000000000000000000000000002".to_string(),
            ),
            credential: Some(Credential::new(ANVIL_KEY.to_string())),
            ..Default::default()
        }
    }

    #[test]
    fn complete_config_produces_settings() {
        let settings = complete().operator_settings().unwrap();

        assert!(settings.endpoint.supports_subscriptions());
        assert_eq!(settings.gas_limit, 1_000_000);
        assert_eq!(settings.gas_price, 20);
        assert_eq!(
            settings.registration,
            Some(RegistrationSettings {
                delegation_manager: Address::with_last_byte(2),
                gas_price: 21000,
            })
        );
        assert_eq!(settings.filter, TaskFilter::all());
        assert_eq!(settings.retry.max_attempts, 1);
        assert!(settings.retry.halt_on_error);
        assert_eq!(settings.retry.attempt_timeout, Duration::from_secs(60));
    }

    #[test]
    fn missing_values_are_named() {
        let config = Config {
            gas_price: None,
            ..complete()
        };
        assert!(matches!(
            config.operator_settings(),
            Err(ConfigError::Missing("gas_price"))
        ));

        let config = Config {
            credential: None,
            ..complete()
        };
        assert!(matches!(
            config.operator_settings(),
            Err(ConfigError::Missing("credential"))
        ));
    }

    #[test]
    fn delegation_manager_only_needed_for_registration() {
        let config = Config {
            delegation_manager_address: None,
            ..complete()
        };
        assert!(matches!(
            config.operator_settings(),
            Err(ConfigError::Missing("delegation_manager_address"))
        ));

        let config = Config {
            skip_registration: true,
            ..config
        };
        assert_eq!(config.operator_settings().unwrap().registration, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = Config {
            service_manager_address: Some("0x1234".to_string()),
            ..complete()
        };
        assert!(matches!(
            config.operator_settings(),
            Err(ConfigError::Invalid {
                field: "service_manager_address",
                ..
            })
        ));

        let config = Config {
            gas_limit: Some(0),
            ..complete()
        };
        assert!(matches!(
            config.operator_settings(),
            Err(ConfigError::Invalid {
                field: "gas_limit",
                ..
            })
        ));

        let config = Config {
            response_max_attempts: 0,
            ..complete()
        };
        assert!(matches!(
            config.operator_settings(),
            Err(ConfigError::Invalid {
                field: "response_max_attempts",
                ..
            })
        ));

        let config = Config {
            rpc_endpoint: Some("ftp://127.0.0.1".to_string()),
            ..complete()
        };
        assert!(matches!(
            config.operator_settings(),
            Err(ConfigError::Invalid {
                field: "rpc_endpoint",
                ..
            })
        ));

        let config = Config {
            credential: Some(Credential::new("not a mnemonic".to_string())),
            ..complete()
        };
        assert!(matches!(
            config.operator_settings(),
            Err(ConfigError::Credential(_))
        ));
    }
}

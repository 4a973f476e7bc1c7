use crate::config::AppConfig;
use crate::payments::error::{ProviderError, ProviderResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::providers::{CardChargeAdapter, RedirectApprovalAdapter};
use crate::payments::sdk::WalletSdkCache;
use crate::payments::settlement::SettlementBackend;
use crate::payments::tokenizer::{CardTokenizer, CardWidget};
use crate::payments::types::PaymentMethod;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PaymentFactoryConfig {
    pub enabled_methods: Vec<PaymentMethod>,
    pub plan_id: Option<String>,
}

impl PaymentFactoryConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            enabled_methods: config.enabled_methods.clone(),
            plan_id: config.wallet.plan_id.clone(),
        }
    }
}

/// Builds one adapter per enabled method over shared collaborators. The
/// card widget is per checkout, so it is supplied on each build.
pub struct PaymentProviderFactory {
    config: PaymentFactoryConfig,
    backend: Arc<dyn SettlementBackend>,
    sdk: Arc<WalletSdkCache>,
}

impl PaymentProviderFactory {
    pub fn new(
        config: PaymentFactoryConfig,
        backend: Arc<dyn SettlementBackend>,
        sdk: Arc<WalletSdkCache>,
    ) -> Self {
        Self {
            config,
            backend,
            sdk,
        }
    }

    pub fn get_provider(
        &self,
        method: PaymentMethod,
        card_widget: &Arc<dyn CardWidget>,
    ) -> ProviderResult<Arc<dyn PaymentProvider>> {
        if !self.config.enabled_methods.contains(&method) {
            return Err(ProviderError::validation(
                format!("payment method {} is disabled", method),
                Some("method"),
            ));
        }

        Ok(match method {
            PaymentMethod::CardProcessor => Arc::new(CardChargeAdapter::new(
                CardTokenizer::new(card_widget.clone()),
                self.backend.clone(),
            )),
            PaymentMethod::WalletProcessor => Arc::new(RedirectApprovalAdapter::new(
                self.sdk.clone(),
                self.backend.clone(),
                self.config.plan_id.clone(),
            )),
        })
    }

    /// Adapters for every enabled method, in configuration order.
    pub fn build_all(
        &self,
        card_widget: Arc<dyn CardWidget>,
    ) -> ProviderResult<Vec<Arc<dyn PaymentProvider>>> {
        self.config
            .enabled_methods
            .iter()
            .map(|method| self.get_provider(*method, &card_widget))
            .collect()
    }

    pub fn list_available_methods(&self) -> Vec<PaymentMethod> {
        self.config.enabled_methods.clone()
    }
}

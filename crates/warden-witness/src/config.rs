//! Witness layer configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::WitnessResult;
use crate::window::WindowConfig;
use crate::witness::Witness;
use crate::witnesses::{
    MomentumConfig, MomentumWitness, VolatilityVetoConfig, VolatilityVetoWitness,
    VolumeConfirmConfig, VolumeConfirmWitness,
};

/// Arbitration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArbitrationConfig {
    #[serde(default)]
    pub window: WindowConfig,
}

impl ArbitrationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.window.min_witnesses < 2 {
            return Err(format!(
                "arbitration.window.min_witnesses ({}) must be at least 2",
                self.window.min_witnesses
            ));
        }
        if self.window.count_bonus.is_sign_negative() {
            return Err(format!(
                "arbitration.window.count_bonus ({}) must be non-negative",
                self.window.count_bonus
            ));
        }
        Ok(())
    }
}

/// Built-in witness set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WitnessSetConfig {
    #[serde(default)]
    pub momentum: MomentumConfig,
    #[serde(default)]
    pub volume_confirm: VolumeConfirmConfig,
    #[serde(default)]
    pub volatility_veto: VolatilityVetoConfig,
}

impl WitnessSetConfig {
    pub fn validate(&self) -> Result<(), String> {
        let ids = [
            &self.momentum.id,
            &self.volume_confirm.id,
            &self.volatility_veto.id,
        ];
        for (i, id) in ids.iter().enumerate() {
            if id.is_empty() {
                return Err("witness ids must not be empty".to_string());
            }
            if ids[..i].contains(id) {
                return Err(format!("duplicate witness id: {id}"));
            }
        }
        Ok(())
    }

    /// Construct the enabled witnesses.
    pub fn build(&self) -> WitnessResult<Vec<Arc<dyn Witness>>> {
        let mut witnesses: Vec<Arc<dyn Witness>> = Vec::new();
        if self.momentum.enabled {
            witnesses.push(Arc::new(MomentumWitness::new(self.momentum.clone())?));
        }
        if self.volume_confirm.enabled {
            witnesses.push(Arc::new(VolumeConfirmWitness::new(
                self.volume_confirm.clone(),
            )?));
        }
        if self.volatility_veto.enabled {
            witnesses.push(Arc::new(VolatilityVetoWitness::new(
                self.volatility_veto.clone(),
            )?));
        }
        Ok(witnesses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(ArbitrationConfig::default().validate().is_ok());
        assert!(WitnessSetConfig::default().validate().is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut config = WitnessSetConfig::default();
        config.volume_confirm.id = config.momentum.id.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_skips_disabled() {
        let mut config = WitnessSetConfig::default();
        assert_eq!(config.build().unwrap().len(), 3);

        config.volume_confirm.enabled = false;
        let ids: Vec<String> = config
            .build()
            .unwrap()
            .iter()
            .map(|w| w.strategy_id().to_string())
            .collect();
        assert_eq!(ids, vec!["momentum", "volatility_veto"]);
    }
}

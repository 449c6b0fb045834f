use crate::error::MemoryError;
use crate::oracle::PlanAction;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeResult {
    #[default]
    None,
    Open,
    Closed,
}

/// Outcome of the most recent trade action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastTrade {
    pub action: PlanAction,
    pub result: TradeResult,
    pub rationale: String,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
}

/// Advisory memory handed to the oracle and kept as an audit trail.
///
/// Never consulted for order decisions; those come from live exchange reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeMemory {
    pub last_trade: LastTrade,
    pub observations: String,
}

impl TradeMemory {
    /// Replace observations with this cycle's oracle notes and core notes
    pub fn record_observations(&mut self, oracle_notes: Option<&str>, cycle_notes: &[String]) {
        let mut lines: Vec<String> = Vec::new();
        if let Some(notes) = oracle_notes.map(str::trim).filter(|n| !n.is_empty()) {
            lines.push(notes.to_string());
        }
        lines.extend(cycle_notes.iter().cloned());
        self.observations = lines.join("\n");
    }
}

/// JSON file holding a single `TradeMemory`
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored memory; a missing file yields the default value.
    pub async fn load(&self) -> Result<TradeMemory, MemoryError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No trade memory at {}, starting fresh", self.path.display());
                Ok(TradeMemory::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the stored memory. Readers see either the old or the new file.
    pub async fn save(&self, memory: &TradeMemory) -> Result<(), MemoryError> {
        let data = serde_json::to_string_pretty(memory)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!("Saved trade memory to {}", self.path.display());
        Ok(())
    }
}

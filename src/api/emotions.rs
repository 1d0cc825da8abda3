use super::client::BackendClient;
use crate::error::{AnimaError, Result};
use crate::models::EmotionRecord;
use serde::Deserialize;
use tracing::debug;

const HISTORY_PATH: &str = "/emociones/historial";
const STATS_PATH: &str = "/emociones/stats";

/// Filter for the analysis history endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Server-side period key, e.g. `semana` or `mes`
    pub period: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl HistoryQuery {
    pub fn period(period: impl Into<String>) -> Self {
        Self {
            period: Some(period.into()),
            ..Self::default()
        }
    }

    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            period: None,
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(period) = &self.period {
            params.push(("periodo", period.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset", offset.to_string()));
        }
        params
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    historial: Option<Vec<EmotionRecord>>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    estadisticas: serde_json::Value,
}

/// Read access to the server-held classification records
#[derive(Clone)]
pub struct EmotionHistoryClient {
    backend: BackendClient,
}

impl EmotionHistoryClient {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    pub async fn history(&self, query: &HistoryQuery, token: &str) -> Result<Vec<EmotionRecord>> {
        let response = self
            .backend
            .get(HISTORY_PATH, token)
            .query(&query.params())
            .send()
            .await
            .map_err(|e| self.backend.transport_error(e, "emotion history"))?;

        let status = response.status();
        if !status.is_success() {
            let details = BackendClient::error_message(response)
                .await
                .unwrap_or_else(|| format!("status {}", status));
            return Err(AnimaError::network(format!(
                "Error al cargar historial: {}",
                details
            )));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| self.backend.transport_error(e, "emotion history"))?;
        let records = body.historial.unwrap_or_default();
        debug!("Loaded {} emotion records", records.len());
        Ok(records)
    }

    /// Server-computed statistics, passed through untouched
    pub async fn stats(&self, token: &str) -> Result<serde_json::Value> {
        let response = self
            .backend
            .get(STATS_PATH, token)
            .send()
            .await
            .map_err(|e| self.backend.transport_error(e, "emotion stats"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnimaError::network(format!(
                "Emotion stats returned status {}",
                status
            )));
        }

        let body: StatsResponse = response
            .json()
            .await
            .map_err(|e| self.backend.transport_error(e, "emotion stats"))?;
        Ok(body.estadisticas)
    }
}

use codec_registry::{CodecRegistry, PayloadEncoding};
use common::{
    clean_string, DomainError, DomainResult, Measurement, MeasurementMetadata, NormalizedUplink,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Deserialize)]
struct LoriotUplink {
    decoded: Option<LoriotDecoded>,
    object: Option<Map<String, Value>>,
    data: Option<String>,
    name: Option<String>,
    #[serde(rename = "EUI")]
    eui: Option<String>,
    devaddr: Option<Value>,
    ts: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LoriotDecoded {
    data: Option<Map<String, Value>>,
}

/// Normalizer for Loriot websocket uplink frames.
///
/// Decoded fields are taken from `decoded.data` or `object`; when both
/// are absent the codec registry decodes the hex `data` field. Loriot
/// frames carry no per-gateway radio telemetry, so normalized uplinks
/// never have signal values.
pub struct LoriotNormalizer {
    registry: Option<Arc<CodecRegistry>>,
    lns_label: String,
}

impl LoriotNormalizer {
    pub fn new(registry: Option<Arc<CodecRegistry>>, lns_label: impl Into<String>) -> Self {
        Self {
            registry,
            lns_label: lns_label.into(),
        }
    }

    #[instrument(skip_all)]
    pub async fn normalize(&self, payload: &[u8]) -> DomainResult<NormalizedUplink> {
        let uplink: LoriotUplink = serde_json::from_slice(payload)
            .map_err(|e| DomainError::MalformedPayload(e.to_string()))?;

        let measurements = self.extract_measurements(&uplink).await?;
        let timestamp_ns = millis_to_nanos(uplink.ts)?;

        let mut metadata = MeasurementMetadata::new();
        metadata.insert("lns".to_string(), Value::String(self.lns_label.clone()));
        if let Some(name) = &uplink.name {
            metadata.insert("deviceName".to_string(), Value::String(name.clone()));
        }
        if let Some(eui) = &uplink.eui {
            metadata.insert("devEui".to_string(), Value::String(eui.clone()));
        }
        if let Some(devaddr) = &uplink.devaddr {
            metadata.insert("devAddr".to_string(), devaddr.clone());
        }

        Ok(NormalizedUplink {
            measurements,
            timestamp_ns,
            measurement_metadata: metadata,
            signal_values: None,
            signal_metadata: None,
        })
    }

    async fn extract_measurements(&self, uplink: &LoriotUplink) -> DomainResult<Vec<Measurement>> {
        let fields = uplink
            .decoded
            .as_ref()
            .and_then(|decoded| decoded.data.as_ref())
            .filter(|fields| !fields.is_empty())
            .or(uplink.object.as_ref());

        if let Some(fields) = fields {
            let measurements: Vec<Measurement> = fields
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(name, value)| Measurement::new(name.clone(), value.clone()))
                .collect();
            if !measurements.is_empty() {
                return Ok(measurements);
            }
        }

        if let (Some(registry), Some(name), Some(data)) =
            (self.registry.as_ref(), uplink.name.as_deref(), uplink.data.as_deref())
        {
            if let Some(measurements) = registry.decode(name, data, PayloadEncoding::Hex).await {
                return Ok(measurements);
            }
        }

        Err(DomainError::NoMeasurements)
    }
}

fn millis_to_nanos(ts: Option<i64>) -> DomainResult<i64> {
    let ts = ts.ok_or_else(|| {
        DomainError::InvalidTimestamp("uplink frame carries no timestamp".to_string())
    })?;

    ts.checked_mul(1_000_000)
        .ok_or_else(|| DomainError::InvalidTimestamp(format!("{ts}: out of range")))
}

/// Derive a network-server label from a websocket URL host.
///
/// `wss://eu1.loriot.io/app?token=abc` becomes `eu1_loriot_io`.
pub fn lns_from_websocket_url(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = rest
        .split(['/', '?'])
        .next()
        .unwrap_or(rest);
    clean_string(host)
}

/// Redact the access token in a websocket URL for logging
pub fn redact_token(url: &str) -> String {
    let Some(start) = url.find("token=") else {
        return url.to_string();
    };
    let value_start = start + "token=".len();
    let value_end = url[value_start..]
        .find('&')
        .map_or(url.len(), |i| value_start + i);

    format!("{}[redacted]{}", &url[..value_start], &url[value_end..])
}

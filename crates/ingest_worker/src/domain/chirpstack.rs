use codec_registry::{CodecRegistry, PayloadEncoding};
use common::{
    clean_string, DomainError, DomainResult, GatewayReception, Measurement, MeasurementMetadata,
    NormalizedUplink, SignalValues,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, instrument, warn};

/// Network-server label stamped on every ChirpStack measurement
pub const CHIRPSTACK_LNS: &str = "local_chirpstack";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChirpstackUplink {
    device_info: Option<DeviceInfo>,
    object: Option<UplinkObject>,
    data: Option<String>,
    time: Option<String>,
    f_cnt: Option<u64>,
    rx_info: Option<Vec<RxInfo>>,
    tx_info: Option<TxInfo>,
    dev_addr: Option<String>,
}

// Device variables are deliberately not modeled here; they can hold
// credentials and must never reach measurement metadata.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceInfo {
    tenant_id: Option<String>,
    tenant_name: Option<String>,
    application_id: Option<String>,
    application_name: Option<String>,
    device_profile_id: Option<String>,
    device_profile_name: Option<String>,
    device_name: Option<String>,
    dev_eui: Option<String>,
    tags: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct UplinkObject {
    measurements: Option<Vec<RawMeasurement>>,
}

#[derive(Debug, Deserialize)]
struct RawMeasurement {
    name: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RxInfo {
    gateway_id: Option<String>,
    rssi: Option<f64>,
    snr: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TxInfo {
    modulation: Option<Modulation>,
}

#[derive(Debug, Deserialize)]
struct Modulation {
    lora: Option<LoraModulation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoraModulation {
    spreading_factor: Option<u64>,
}

/// Normalizer for ChirpStack uplink events.
///
/// Pulls measurements from the server-side decoded `object`, falling
/// back to the codec registry against the base64 `data` field when the
/// server decoded nothing.
pub struct ChirpstackNormalizer {
    registry: Option<Arc<CodecRegistry>>,
    signal_indicators: bool,
}

impl ChirpstackNormalizer {
    pub fn new(registry: Option<Arc<CodecRegistry>>, signal_indicators: bool) -> Self {
        Self {
            registry,
            signal_indicators,
        }
    }

    #[instrument(skip_all)]
    pub async fn normalize(&self, payload: &[u8]) -> DomainResult<NormalizedUplink> {
        let uplink: ChirpstackUplink = serde_json::from_slice(payload)
            .map_err(|e| DomainError::MalformedPayload(e.to_string()))?;

        let device_name = uplink
            .device_info
            .as_ref()
            .and_then(|info| info.device_name.as_deref());

        let measurements = self.extract_measurements(&uplink, device_name).await?;
        let timestamp_ns = parse_event_time(uplink.time.as_deref())?;
        let measurement_metadata = build_measurement_metadata(&uplink);

        let (signal_values, signal_metadata) = if self.signal_indicators {
            (
                Some(extract_signal_values(&uplink)),
                Some(build_signal_metadata(&uplink)),
            )
        } else {
            (None, None)
        };

        Ok(NormalizedUplink {
            measurements,
            timestamp_ns,
            measurement_metadata,
            signal_values,
            signal_metadata,
        })
    }

    async fn extract_measurements(
        &self,
        uplink: &ChirpstackUplink,
        device_name: Option<&str>,
    ) -> DomainResult<Vec<Measurement>> {
        let decoded: Vec<Measurement> = uplink
            .object
            .as_ref()
            .and_then(|object| object.measurements.as_ref())
            .map(|measurements| {
                measurements
                    .iter()
                    .map(|m| Measurement::new(m.name.clone(), m.value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if !decoded.is_empty() {
            return Ok(decoded);
        }

        if let (Some(registry), Some(device_name), Some(data)) =
            (self.registry.as_ref(), device_name, uplink.data.as_deref())
        {
            if let Some(measurements) = registry
                .decode(device_name, data, PayloadEncoding::Base64)
                .await
            {
                return Ok(measurements);
            }
        }

        Err(DomainError::NoMeasurements)
    }
}

fn parse_event_time(time: Option<&str>) -> DomainResult<i64> {
    let time = time.ok_or_else(|| {
        DomainError::InvalidTimestamp("uplink event carries no time".to_string())
    })?;

    let parsed = chrono::DateTime::parse_from_rfc3339(time)
        .map_err(|e| DomainError::InvalidTimestamp(format!("{time}: {e}")))?;

    parsed
        .timestamp_nanos_opt()
        .ok_or_else(|| DomainError::InvalidTimestamp(format!("{time}: out of range")))
}

fn build_measurement_metadata(uplink: &ChirpstackUplink) -> MeasurementMetadata {
    let mut metadata = MeasurementMetadata::new();
    metadata.insert("lns".to_string(), Value::String(CHIRPSTACK_LNS.to_string()));

    if let Some(dev_addr) = &uplink.dev_addr {
        metadata.insert("devAddr".to_string(), Value::String(dev_addr.clone()));
    }

    let Some(info) = &uplink.device_info else {
        error!("uplink event carries no device info");
        return metadata;
    };

    let fields = [
        ("tenantId", &info.tenant_id),
        ("tenantName", &info.tenant_name),
        ("applicationId", &info.application_id),
        ("applicationName", &info.application_name),
        ("deviceProfileId", &info.device_profile_id),
        ("deviceProfileName", &info.device_profile_name),
        ("deviceName", &info.device_name),
        ("devEui", &info.dev_eui),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            metadata.insert(key.to_string(), Value::String(value.clone()));
        }
    }

    insert_tags(&mut metadata, info.tags.as_ref());
    metadata
}

fn build_signal_metadata(uplink: &ChirpstackUplink) -> MeasurementMetadata {
    let mut metadata = MeasurementMetadata::new();
    metadata.insert("lns".to_string(), Value::String(CHIRPSTACK_LNS.to_string()));

    if let Some(info) = &uplink.device_info {
        if let Some(device_name) = &info.device_name {
            metadata.insert("deviceName".to_string(), Value::String(device_name.clone()));
        }
        if let Some(dev_eui) = &info.dev_eui {
            metadata.insert("devEui".to_string(), Value::String(dev_eui.clone()));
        }
        insert_tags(&mut metadata, info.tags.as_ref());
    }

    metadata
}

fn insert_tags(metadata: &mut MeasurementMetadata, tags: Option<&Map<String, Value>>) {
    let Some(tags) = tags else { return };
    for (key, value) in tags {
        let key = format!("{}_tag", clean_string(key));
        metadata.insert(key, value.clone());
    }
}

fn extract_signal_values(uplink: &ChirpstackUplink) -> SignalValues {
    let reception = match &uplink.rx_info {
        Some(rx_info) => rx_info
            .iter()
            .map(|rx| GatewayReception {
                gateway_id: rx.gateway_id.clone(),
                rssi: rx.rssi,
                snr: rx.snr,
            })
            .collect(),
        None => {
            error!("uplink event carries no gateway reception info");
            Vec::new()
        }
    };

    let spreading_factor = uplink
        .tx_info
        .as_ref()
        .and_then(|tx| tx.modulation.as_ref())
        .and_then(|modulation| modulation.lora.as_ref())
        .and_then(|lora| lora.spreading_factor);
    if spreading_factor.is_none() {
        warn!("uplink event carries no spreading factor");
    }

    SignalValues {
        reception,
        spreading_factor,
        f_cnt: uplink.f_cnt,
    }
}

use serde_json::{Map, Value};

/// Metadata attached to every published measurement.
///
/// Holds only static, non-sensitive device context (network-server
/// label, tenant/application/device identifiers, cleaned device tags
/// with a `_tag` suffix). Device variables are never extracted into
/// this map; they can hold credentials.
pub type MeasurementMetadata = Map<String, Value>;

/// One named measurement extracted from an uplink.
///
/// The name stays as delivered by the network server until the publish
/// pipeline cleans it; the value is whatever scalar the server or a
/// codec produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: String,
    pub value: Value,
}

impl Measurement {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Radio reception as reported by a single gateway for one uplink.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReception {
    pub gateway_id: Option<String>,
    pub rssi: Option<f64>,
    pub snr: Option<f64>,
}

/// Per-uplink signal-quality values shared by all gateways plus the
/// per-gateway reception list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalValues {
    pub reception: Vec<GatewayReception>,
    pub spreading_factor: Option<u64>,
    pub f_cnt: Option<u64>,
}

/// Output contract of both payload normalizers.
///
/// `signal_values`/`signal_metadata` are present only when the source
/// schema carries radio telemetry and signal reporting is enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedUplink {
    pub measurements: Vec<Measurement>,
    pub timestamp_ns: i64,
    pub measurement_metadata: MeasurementMetadata,
    pub signal_values: Option<SignalValues>,
    pub signal_metadata: Option<MeasurementMetadata>,
}

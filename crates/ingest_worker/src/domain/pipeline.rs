use crate::config::FilterConfig;
use crate::domain::PacketLossEstimator;
use common::{clean_string, MeasurementMetadata, MeasurementSink, NormalizedUplink};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Publishes normalized uplinks to the measurement sink.
///
/// Applies ignore/collect filtering on raw names, cleans names on the
/// way out, and derives the `signal.*` measurement family when the
/// uplink carries radio telemetry. One failed publish never aborts the
/// rest of the uplink.
pub struct PublishPipeline {
    sink: Arc<dyn MeasurementSink>,
    filter: FilterConfig,
    loss: PacketLossEstimator,
}

impl PublishPipeline {
    pub fn new(
        sink: Arc<dyn MeasurementSink>,
        filter: FilterConfig,
        loss: PacketLossEstimator,
    ) -> Self {
        Self { sink, filter, loss }
    }

    #[instrument(skip_all)]
    pub async fn process(&self, uplink: &NormalizedUplink) {
        for measurement in &uplink.measurements {
            if !self.should_collect(&measurement.name) {
                continue;
            }
            let name = clean_string(&measurement.name);
            self.publish(
                &name,
                &measurement.value,
                uplink.timestamp_ns,
                &uplink.measurement_metadata,
            )
            .await;
        }

        if !self.filter.signal_indicators {
            return;
        }
        let (Some(values), Some(metadata)) = (&uplink.signal_values, &uplink.signal_metadata)
        else {
            return;
        };

        if let Some(spreading_factor) = values.spreading_factor {
            self.publish(
                "signal.spreadingfactor",
                &json!(spreading_factor),
                uplink.timestamp_ns,
                metadata,
            )
            .await;
        }

        let dev_eui = metadata
            .get("devEui")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let (lost, loss_rate) = self.loss.process(dev_eui, values.f_cnt);
        self.publish("signal.pl", &json!(lost), uplink.timestamp_ns, metadata)
            .await;
        if let Some(loss_rate) = loss_rate {
            self.publish("signal.plr", &json!(loss_rate), uplink.timestamp_ns, metadata)
                .await;
        }

        for reception in &values.reception {
            let mut gateway_metadata = metadata.clone();
            if let Some(gateway_id) = &reception.gateway_id {
                gateway_metadata
                    .insert("gatewayId".to_string(), Value::String(gateway_id.clone()));
            }
            if let Some(rssi) = reception.rssi {
                self.publish(
                    "signal.rssi",
                    &json!(rssi),
                    uplink.timestamp_ns,
                    &gateway_metadata,
                )
                .await;
            }
            if let Some(snr) = reception.snr {
                self.publish(
                    "signal.snr",
                    &json!(snr),
                    uplink.timestamp_ns,
                    &gateway_metadata,
                )
                .await;
            }
        }
    }

    /// Log what `process` would publish without touching the sink.
    ///
    /// Still feeds the loss estimator so dry runs report the same
    /// pl/plr values a live run would.
    pub fn log_measurements(&self, uplink: &NormalizedUplink) {
        for measurement in &uplink.measurements {
            if !self.should_collect(&measurement.name) {
                continue;
            }
            self.log_one(&clean_string(&measurement.name), &measurement.value, uplink);
        }

        if !self.filter.signal_indicators {
            return;
        }
        let (Some(values), Some(metadata)) = (&uplink.signal_values, &uplink.signal_metadata)
        else {
            return;
        };

        if let Some(spreading_factor) = values.spreading_factor {
            self.log_one("signal.spreadingfactor", &json!(spreading_factor), uplink);
        }

        let dev_eui = metadata
            .get("devEui")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let (lost, loss_rate) = self.loss.process(dev_eui, values.f_cnt);
        self.log_one("signal.pl", &json!(lost), uplink);
        if let Some(loss_rate) = loss_rate {
            self.log_one("signal.plr", &json!(loss_rate), uplink);
        }

        for reception in &values.reception {
            if let Some(rssi) = reception.rssi {
                self.log_one("signal.rssi", &json!(rssi), uplink);
            }
            if let Some(snr) = reception.snr {
                self.log_one("signal.snr", &json!(snr), uplink);
            }
        }
    }

    fn log_one(&self, name: &str, value: &Value, uplink: &NormalizedUplink) {
        info!(
            name = %name,
            value = %value,
            timestamp_ns = uplink.timestamp_ns,
            "dry run, measurement not published"
        );
    }

    fn should_collect(&self, raw_name: &str) -> bool {
        if self.filter.ignore.contains(raw_name) {
            return false;
        }
        self.filter.collect.is_empty() || self.filter.collect.contains(raw_name)
    }

    async fn publish(
        &self,
        name: &str,
        value: &Value,
        timestamp_ns: i64,
        metadata: &MeasurementMetadata,
    ) {
        if value.is_null() {
            return;
        }

        match self.sink.publish(name, value, timestamp_ns, metadata).await {
            Ok(()) => debug!(name = %name, "published measurement"),
            Err(e) => error!(name = %name, error = %e, "failed to publish measurement"),
        }
    }
}

use async_trait::async_trait;
use common::{DomainError, DomainResult, MeasurementMetadata, MeasurementSink};
use ingest_worker::{
    ChirpstackHandler, ChirpstackNormalizer, FilterConfig, LoriotHandler, LoriotNormalizer,
    PacketLossEstimator, PublishPipeline, UplinkHandler,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Published {
    name: String,
    value: Value,
    timestamp_ns: i64,
    metadata: MeasurementMetadata,
}

#[derive(Default)]
struct CapturingSink {
    records: Mutex<Vec<Published>>,
}

impl CapturingSink {
    fn records(&self) -> Vec<Published> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl MeasurementSink for CapturingSink {
    async fn publish(
        &self,
        name: &str,
        value: &Value,
        timestamp_ns: i64,
        metadata: &MeasurementMetadata,
    ) -> DomainResult<()> {
        self.records.lock().unwrap().push(Published {
            name: name.to_string(),
            value: value.clone(),
            timestamp_ns,
            metadata: metadata.clone(),
        });
        Ok(())
    }
}

fn chirpstack_event() -> Value {
    json!({
        "deviceInfo": {
            "tenantId": "t-1",
            "tenantName": "acme",
            "applicationId": "a-1",
            "applicationName": "farm",
            "deviceProfileId": "p-1",
            "deviceProfileName": "env-sensor",
            "deviceName": "greenhouse-7",
            "devEui": "aa11bb22cc33dd44",
            "tags": { "site": "north" }
        },
        "devAddr": "01020304",
        "time": "2024-01-01T00:00:00+00:00",
        "fCnt": 42,
        "object": {
            "measurements": [
                { "name": "Temp C", "value": 21.5 },
                { "name": "battery", "value": null }
            ]
        },
        "rxInfo": [
            { "gatewayId": "gw-1", "rssi": -97.0, "snr": 9.5 },
            { "gatewayId": "gw-2", "rssi": -104.0, "snr": 2.25 }
        ],
        "txInfo": { "modulation": { "lora": { "spreadingFactor": 7 } } }
    })
}

fn filter(signal_indicators: bool) -> FilterConfig {
    FilterConfig {
        ignore: HashSet::new(),
        collect: HashSet::new(),
        signal_indicators,
    }
}

#[tokio::test]
async fn test_chirpstack_event_publishes_cleaned_measurement() {
    let sink = Arc::new(CapturingSink::default());
    let pipeline = Arc::new(PublishPipeline::new(
        sink.clone(),
        filter(false),
        PacketLossEstimator::new(Duration::from_secs(3600)),
    ));
    let handler = ChirpstackHandler::new(ChirpstackNormalizer::new(None, false), pipeline, false);

    let payload = serde_json::to_vec(&chirpstack_event()).unwrap();
    handler.handle_message(&payload).await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "temp_c");
    assert_eq!(records[0].value, json!(21.5));
    assert_eq!(records[0].timestamp_ns, 1_704_067_200_000_000_000);
    assert_eq!(records[0].metadata.get("lns"), Some(&json!("local_chirpstack")));
    assert_eq!(
        records[0].metadata.get("devEui"),
        Some(&json!("aa11bb22cc33dd44"))
    );
    assert_eq!(records[0].metadata.get("site_tag"), Some(&json!("north")));
}

#[tokio::test]
async fn test_chirpstack_event_publishes_signal_family_per_gateway() {
    let sink = Arc::new(CapturingSink::default());
    let pipeline = Arc::new(PublishPipeline::new(
        sink.clone(),
        filter(true),
        PacketLossEstimator::new(Duration::from_secs(3600)),
    ));
    let handler = ChirpstackHandler::new(ChirpstackNormalizer::new(None, true), pipeline, false);

    let payload = serde_json::to_vec(&chirpstack_event()).unwrap();
    handler.handle_message(&payload).await.unwrap();

    let records = sink.records();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "temp_c",
            "signal.spreadingfactor",
            "signal.pl",
            "signal.rssi",
            "signal.snr",
            "signal.rssi",
            "signal.snr",
        ]
    );

    let spreading = &records[1];
    assert_eq!(spreading.value, json!(7));
    assert_eq!(
        spreading.metadata.get("deviceName"),
        Some(&json!("greenhouse-7"))
    );

    let rssi_gw1 = &records[3];
    assert_eq!(rssi_gw1.value, json!(-97.0));
    assert_eq!(rssi_gw1.metadata.get("gatewayId"), Some(&json!("gw-1")));

    let rssi_gw2 = &records[5];
    assert_eq!(rssi_gw2.value, json!(-104.0));
    assert_eq!(rssi_gw2.metadata.get("gatewayId"), Some(&json!("gw-2")));
}

#[tokio::test]
async fn test_chirpstack_frame_gap_is_published_as_packet_loss() {
    let sink = Arc::new(CapturingSink::default());
    let pipeline = Arc::new(PublishPipeline::new(
        sink.clone(),
        filter(true),
        PacketLossEstimator::new(Duration::from_secs(3600)),
    ));
    let handler = ChirpstackHandler::new(ChirpstackNormalizer::new(None, true), pipeline, false);

    let first = serde_json::to_vec(&chirpstack_event()).unwrap();
    handler.handle_message(&first).await.unwrap();

    let mut event = chirpstack_event();
    event["fCnt"] = json!(45);
    let second = serde_json::to_vec(&event).unwrap();
    handler.handle_message(&second).await.unwrap();

    let losses: Vec<Value> = sink
        .records()
        .iter()
        .filter(|r| r.name == "signal.pl")
        .map(|r| r.value.clone())
        .collect();
    assert_eq!(losses, vec![json!(0), json!(2)]);
}

#[tokio::test]
async fn test_loriot_frame_publishes_without_signal_family() {
    let sink = Arc::new(CapturingSink::default());
    let pipeline = Arc::new(PublishPipeline::new(
        sink.clone(),
        filter(true),
        PacketLossEstimator::new(Duration::from_secs(3600)),
    ));
    let handler = LoriotHandler::new(
        LoriotNormalizer::new(None, "eu1_loriot_io"),
        pipeline,
        false,
    );

    let frame = json!({
        "cmd": "rx",
        "EUI": "AA11BB22CC33DD44",
        "name": "field-unit-3",
        "ts": 1_704_067_200_000_i64,
        "decoded": { "data": { "Temp C": 21.5 } }
    });
    let payload = serde_json::to_vec(&frame).unwrap();
    handler.handle_message(&payload).await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "temp_c");
    assert_eq!(records[0].timestamp_ns, 1_704_067_200_000_000_000);
    assert_eq!(records[0].metadata.get("lns"), Some(&json!("eu1_loriot_io")));
}

#[tokio::test]
async fn test_rejected_message_publishes_nothing() {
    let sink = Arc::new(CapturingSink::default());
    let pipeline = Arc::new(PublishPipeline::new(
        sink.clone(),
        filter(false),
        PacketLossEstimator::new(Duration::from_secs(3600)),
    ));
    let handler = ChirpstackHandler::new(ChirpstackNormalizer::new(None, false), pipeline, false);

    let result = handler.handle_message(b"{\"object\": {}}").await;

    assert!(matches!(result, Err(DomainError::NoMeasurements)));
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn test_dry_run_publishes_nothing() {
    let sink = Arc::new(CapturingSink::default());
    let pipeline = Arc::new(PublishPipeline::new(
        sink.clone(),
        filter(false),
        PacketLossEstimator::new(Duration::from_secs(3600)),
    ));
    let handler = ChirpstackHandler::new(ChirpstackNormalizer::new(None, false), pipeline, true);

    let payload = serde_json::to_vec(&chirpstack_event()).unwrap();
    handler.handle_message(&payload).await.unwrap();

    assert!(sink.records().is_empty());
}

use bytes::Bytes;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use garagebot_link::core::{
    HeartbeatStrategy, MAX_INBOUND_FRAME_BYTES, MAX_OUTBOUND_FRAME_BYTES, SentinelHeartbeat,
    WsFrame,
};
use garagebot_link::protocol::{
    DeviceEvent, OutboundMessage, SensorPosition, VirtualButton, decode_frame, encode_message,
};

const STATUS: &str = r#"{"m":"SC","p":{"door_state":"OPEN","mqtt_state":"CONNECTED","mqtt_error":null}}"#;
const SENSORS: &str = r#"{"m":"SD","p":{"top_detected":true,"top_ambient":12,"top_active":190,"bottom_detected":false,"bottom_ambient":9,"bottom_active":14,"available_memory":20480}}"#;

fn bench_decode(c: &mut Criterion) {
    let status = WsFrame::Text(Bytes::from_static(STATUS.as_bytes()));
    let sensors = WsFrame::Text(Bytes::from_static(SENSORS.as_bytes()));
    let pong = WsFrame::text_static("PONG");

    let mut group = c.benchmark_group("decode");
    group.bench_function("status_change", |b| {
        b.iter(|| decode_frame(black_box(&status), MAX_INBOUND_FRAME_BYTES))
    });
    group.bench_function("sensor_data_typed", |b| {
        b.iter(|| {
            let decoded = decode_frame(black_box(&sensors), MAX_INBOUND_FRAME_BYTES);
            match decoded {
                Ok(garagebot_link::protocol::DecodedFrame::Message(m)) => {
                    DeviceEvent::from_message(&m).ok()
                }
                _ => None,
            }
        })
    });
    group.bench_function("pong_sentinel", |b| {
        b.iter(|| decode_frame(black_box(&pong), MAX_INBOUND_FRAME_BYTES))
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let press = OutboundMessage::button_press(VirtualButton::Activate);
    let threshold = OutboundMessage::set_sensor_threshold(SensorPosition::Bottom, 120);

    let mut group = c.benchmark_group("encode");
    group.bench_function("button_press", |b| {
        b.iter(|| encode_message(black_box(&press), MAX_OUTBOUND_FRAME_BYTES))
    });
    group.bench_function("sensor_threshold", |b| {
        b.iter(|| encode_message(black_box(&threshold), MAX_OUTBOUND_FRAME_BYTES))
    });
    group.finish();
}

fn bench_heartbeat(c: &mut Criterion) {
    let pong = WsFrame::text_static("PONG");
    let status = WsFrame::Text(Bytes::from_static(STATUS.as_bytes()));
    let mut heartbeat = SentinelHeartbeat::default();

    c.bench_function("heartbeat/ping_pong_cycle", |b| {
        b.iter(|| {
            let ping = heartbeat.create_ping();
            black_box(ping);
            heartbeat.handle_inbound(black_box(&pong))
        })
    });
    c.bench_function("heartbeat/non_pong_passthrough", |b| {
        b.iter(|| heartbeat.handle_inbound(black_box(&status)))
    });
}

criterion_group!(benches, bench_decode, bench_encode, bench_heartbeat);
criterion_main!(benches);

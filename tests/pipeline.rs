//! # Pipeline Tests
//!
//! End-to-end coverage of the theme -> render -> device path using the
//! virtual device, plus manager and scheduler behavior that only shows up
//! across module boundaries. No USB hardware is required.

use hidapi::HidApi;
use image::Rgba;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use panelstream::device::registry::DEVICE_REGISTRY;
use panelstream::device::{device_key, DeviceManager, ProtocolStatus};
use panelstream::render::text::FontStore;
use panelstream::render::FrameProducer;
use panelstream::sensors::{SensorCache, SensorSnapshot, SourceKey};
use panelstream::stream::StreamScheduler;
use panelstream::theme::{Element, ElementKind, Theme};

fn test_manager() -> DeviceManager {
    DeviceManager::with_api(HidApi::new_without_enumerate().expect("hidapi context"))
}

fn test_producer() -> FrameProducer {
    FrameProducer::with_fonts(FontStore::with_dirs(&[]))
}

#[test]
fn theme_renders_and_streams_to_dummy_device() {
    let mut manager = test_manager();
    let key = manager.connect(0xFFFF, 0x0001).unwrap().expect("dummy key");
    assert_eq!(key, device_key(0xFFFF, 0x0001));

    let theme_json = r##"{
        "name": "integration",
        "background_color": "#101018",
        "display_width": 128,
        "display_height": 64,
        "elements": [
            {"type": "bar_gauge", "x": 4, "y": 40, "width": 120, "height": 16,
             "source": "cpu_percent", "text": "CPU", "bar_text_mode": "none",
             "auto_color_change": false},
            {"type": "rectangle", "x": 0, "y": 0, "width": 128, "height": 8,
             "color": "#223344"}
        ]
    }"##;
    let theme = Theme::from_json(theme_json).unwrap();

    let mut snapshot = SensorSnapshot::new();
    snapshot.set(SourceKey::CpuPercent, 25.0);

    let mut producer = test_producer();
    let frame = producer.render(&theme, &snapshot);
    assert_eq!(frame.dimensions(), (128, 64));
    // Top strip is the rectangle, not the background
    assert_eq!(frame.get_pixel(64, 4), &Rgba([0x22, 0x33, 0x44, 255]));

    let driver = manager.get_device_mut(&key).unwrap();
    driver.send_frame(&frame).unwrap();
    driver.send_frame(&frame).unwrap();
}

#[test]
fn manager_handles_multiple_devices_independently() {
    let mut manager = test_manager();
    let dummy = manager.connect(0xFFFF, 0x0001).unwrap();
    assert!(dummy.is_some());

    // An unverified chipset never joins the connected set
    let stub = manager.connect(0x0416, 0x5408).unwrap();
    assert!(stub.is_none());
    assert_eq!(manager.connected_keys(), vec!["ffff:0001".to_string()]);

    // Disconnecting an unrelated id leaves the dummy alone
    manager.disconnect(0x0416, 0x5302);
    assert!(manager.is_connected());

    manager.disconnect_all();
    assert!(!manager.is_connected());
}

#[test]
fn every_stub_in_registry_is_diagnose_only() {
    let mut manager = test_manager();
    for entry in DEVICE_REGISTRY {
        let driver = (entry.build)();
        if driver.protocol_status() == ProtocolStatus::Unverified {
            let connected = manager.connect(entry.vendor_id, entry.product_id).unwrap();
            assert!(
                connected.is_none(),
                "{} must not stream",
                driver.device_name()
            );
        }
    }
    assert!(!manager.is_connected());
}

#[test]
fn scheduler_streams_and_retargets_live() {
    let mut manager = test_manager();
    manager.connect(0xFFFF, 0x0001).unwrap();
    let manager = Arc::new(Mutex::new(manager));
    let theme = Arc::new(Mutex::new(Theme {
        display_width: 32,
        display_height: 32,
        ..Theme::default()
    }));

    let scheduler = StreamScheduler::start(
        Arc::clone(&manager),
        theme,
        SensorCache::new(),
        30,
    );
    std::thread::sleep(Duration::from_millis(400));
    assert!(scheduler.actual_fps() > 1.0, "scheduler produced no frames");

    // Retarget mid-stream; the next ticks use the new interval
    scheduler.set_target_fps(10);
    assert_eq!(scheduler.target_fps(), 10);
    std::thread::sleep(Duration::from_millis(200));

    let begin = Instant::now();
    scheduler.stop();
    assert!(begin.elapsed() < Duration::from_secs(2));
    assert!(manager.lock().unwrap().is_connected());
}

#[test]
fn retarget_interrupts_an_in_flight_sleep() {
    let mut manager = test_manager();
    manager.connect(0xFFFF, 0x0001).unwrap();
    let manager = Arc::new(Mutex::new(manager));
    let theme = Arc::new(Mutex::new(Theme {
        display_width: 32,
        display_height: 32,
        ..Theme::default()
    }));

    // At 1 FPS the first tick fires immediately and the second is a full
    // second away. Raising the rate mid-sleep must reschedule that tick,
    // not wait out the old interval.
    let scheduler = StreamScheduler::start(manager, theme, SensorCache::new(), 1);
    std::thread::sleep(Duration::from_millis(100));
    scheduler.set_target_fps(30);
    std::thread::sleep(Duration::from_millis(400));
    assert!(
        scheduler.actual_fps() > 0.0,
        "no tick within 400ms of retargeting 1->30 FPS"
    );
    scheduler.stop();
}

#[test]
fn live_elements_track_snapshot_not_stored_value() {
    // Two stacked rectangles driven by the same live bar: index 0 wins
    let mut top = Element::new(ElementKind::BarGauge);
    top.x = 0;
    top.y = 0;
    top.width = 100;
    top.height = 20;
    top.source = SourceKey::GpuPercent;
    top.value = 100.0; // stale
    top.color = "#ff0000".to_string();
    top.background_color = "#000000".to_string();
    top.auto_color_change = false;
    top.bar_text_mode = panelstream::theme::element::BarTextMode::None;

    let theme = Theme {
        display_width: 100,
        display_height: 20,
        background_color: "#000000".to_string(),
        elements: vec![top],
        ..Theme::default()
    };

    let mut snapshot = SensorSnapshot::new();
    snapshot.set(SourceKey::GpuPercent, 10.0);

    let mut producer = test_producer();
    let frame = producer.render(&theme, &snapshot);
    // 10% fill: x=5 filled, x=50 empty
    assert_eq!(frame.get_pixel(5, 10), &Rgba([255, 0, 0, 255]));
    assert_eq!(frame.get_pixel(50, 10), &Rgba([0, 0, 0, 255]));

    // Snapshot moves, frame follows
    snapshot.set(SourceKey::GpuPercent, 80.0);
    let frame = producer.render(&theme, &snapshot);
    assert_eq!(frame.get_pixel(50, 10), &Rgba([255, 0, 0, 255]));
}

#[test]
fn jpeg_frames_are_panel_sized_payloads() {
    use panelstream::device::trofeo::build_frame_packets;

    let theme = Theme {
        display_width: 1280,
        display_height: 480,
        ..Theme::default()
    };
    let mut producer = test_producer();
    let frame = producer.render(&theme, &SensorSnapshot::new());
    let jpeg = FrameProducer::encode_jpeg(&frame).unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    let packets = build_frame_packets(&jpeg);
    let expected = 1 + jpeg.len().saturating_sub(492).div_ceil(512);
    assert_eq!(packets.len(), expected);
    assert_eq!(
        u32::from_le_bytes(packets[0][16..20].try_into().unwrap()) as usize,
        jpeg.len()
    );
}

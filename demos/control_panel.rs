//! Headless control panel: connects to a device, prints what it reports, and optionally
//! presses the virtual button once.
//!
//! ```text
//! GARAGEBOT_HOST=192.168.1.40 GARAGEBOT_PRESS=1 RUST_LOG=garagebot_link=debug \
//!     cargo run --example control_panel
//! ```

use std::time::Duration;

use garagebot_link::protocol::VirtualButton;
use garagebot_link::{
    ConnectionState, DeviceEvent, GarageLink, LinkConfig, OutboundMessage, UserActivity,
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let host = std::env::var("GARAGEBOT_HOST").unwrap_or_else(|_| "garagebot.local".to_string());
    let press = std::env::var("GARAGEBOT_PRESS").is_ok();

    let activity = UserActivity::with_inactivity_threshold(Duration::from_secs(120));
    let link = GarageLink::new(LinkConfig::for_device(&host), activity);

    link.on_state_change(|state| println!("link: {state}")).detach();
    link.on_message(|message| match DeviceEvent::from_message(message) {
        Ok(DeviceEvent::Status(status)) => println!(
            "door: {:?} mqtt: {:?} {}",
            status.door_state,
            status.mqtt_state,
            status.mqtt_error.unwrap_or_default()
        ),
        Ok(DeviceEvent::Config(config)) => println!(
            "device: {} firmware {}",
            config.device_name.unwrap_or_default(),
            config.firmware_version.unwrap_or_default()
        ),
        Ok(DeviceEvent::Sensors(sensors)) => println!(
            "sensors: top={} bottom={}",
            sensors.top_detected, sensors.bottom_detected
        ),
        Ok(DeviceEvent::Rebooting) => println!("device is rebooting"),
        Err(err) => eprintln!("unreadable {}: {err}", message.kind),
    })
    .detach();

    if let Err(err) = link.connect().await {
        eprintln!("connect failed: {err}");
        return;
    }

    if press {
        match link
            .wait_for_state(ConnectionState::Connected, Duration::from_secs(10))
            .await
        {
            Ok(()) => {
                if let Err(err) = link
                    .send_message(&OutboundMessage::button_press(VirtualButton::Activate))
                    .await
                {
                    eprintln!("button press failed: {err}");
                }
            }
            Err(err) => eprintln!("device unreachable: {err}"),
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    match link.stats().await {
        Ok(stats) => println!("stats: {stats:?}"),
        Err(err) => eprintln!("stats error: {err}"),
    }
    link.stop().await;
}

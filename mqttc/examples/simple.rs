use std::time::Duration;

use mqttc::{Client, Options, QoS, Result, Will};

#[tokio::main]
async fn main() -> Result<()> {
    simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Info).init().ok();

    let client = Client::new();
    client.on_message(|topic, payload| log::info!("{topic}: {}", String::from_utf8_lossy(payload)));

    let opts = Options::new("mqttc-simple")
        .keepalive(Duration::from_secs(10))
        .last_will(Will::new("mqttc/simple/status", "offline", QoS::AtLeastOnce, true));
    let ack = client.connect("mqtt://127.0.0.1:1883", opts).await?.wait(Duration::ZERO).await?;
    log::info!("connected, session present: {}", ack.session_present);

    let codes = client.subscribe("mqttc/simple/#", QoS::ExactlyOnce).await?.wait(Duration::ZERO).await?;
    log::info!("subscribed, {codes:?}");

    for qos in [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce] {
        client
            .publish("mqttc/simple/data", format!("hello qos {}", qos.value()), qos, false)
            .await?
            .wait(Duration::from_secs(5))
            .await?;
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    client.disconnect().await
}

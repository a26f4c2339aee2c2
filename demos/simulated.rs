//! Bridge a simulated temperature, pressure and humidity sensor

use clap::Parser;
use homeassistant_sensor_bridge::connector::{BridgeOptions, ConnectionStateMachine, MqttTransport};
use homeassistant_sensor_bridge::environment::{HardwareEnvironment, LinuxEnvironment};
use homeassistant_sensor_bridge::model::{
    DeviceAggregate, DeviceOptions, Reading, ReadingCell, SensorClass, SensorDescriptor,
};
use homeassistant_sensor_bridge::physical::PhysicalDevice;
use homeassistant_sensor_bridge::sampler::SamplerLoop;
use rand::Rng;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, clap::Parser)]
struct Cli {
    #[command(flatten)]
    bridge: BridgeOptions,

    /// Name of the device in Home Assistant
    #[arg(long, env, default_value = "simulated280")]
    name: String,
}

#[derive(Default)]
struct SimulatedDevice {
    reading: ReadingCell,
}

impl PhysicalDevice for SimulatedDevice {
    type Error = Infallible;

    async fn sample(&self) -> Result<(), Self::Error> {
        let mut rng = rand::thread_rng();
        self.reading.store(
            Reading::new(SystemTime::now())
                .with("temperature", (rng.gen_range(180..260) as f64) / 10.0)
                .with("pressure", (rng.gen_range(9900..10300) as f64) / 10.0)
                .with("humidity", (rng.gen_range(300..600) as f64) / 10.0),
        );
        Ok(())
    }

    fn data(&self) -> Reading {
        self.reading.load()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let options = cli.bridge;
    let environment: Arc<dyn HardwareEnvironment> = Arc::new(LinuxEnvironment::new());

    let sensor = |units: &str, class: SensorClass| {
        SensorDescriptor::new(
            units,
            class.as_ref(),
            options.topic_base(),
            class,
            options.expire_after,
        )
    };
    let sensors = vec![
        sensor("°C", SensorClass::Temperature)?,
        sensor("mbar", SensorClass::Pressure)?,
        sensor("%", SensorClass::Humidity)?,
    ];

    let device = Arc::new(DeviceAggregate::new(
        sensors,
        &cli.name,
        format!("{}/state", cli.name),
        "Simulated",
        "BME280",
        DeviceOptions {
            base_name: Some(options.topic_base().to_string()),
            sw_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            qos: options.qos,
            ..Default::default()
        },
        environment.as_ref(),
    )?);
    log::info!("Discovery payload: {}", device.serialize()?);

    let physical = Arc::new(SimulatedDevice::default());
    let mut sampler = SamplerLoop::new(physical.clone(), options.polling_interval)
        .with_warm_up(options.warm_up);
    sampler.start();

    let client_id = options.client_id("sim280", &environment.object_id());
    let (transport, events) = MqttTransport::new(&options, client_id);
    let machine = Arc::new(ConnectionStateMachine::new(
        transport,
        device,
        physical,
        environment,
        &options,
    )?);

    let dispatcher = machine.clone();
    let dispatch = tokio::spawn(async move { dispatcher.process_events(events).await });

    let rc = machine.connect().await;
    if !rc.is_success() {
        anyhow::bail!("Unable to connect: {rc}");
    }
    // Home Assistant only says "online" when it starts, so don't wait for that
    machine.publish_discovery().await;
    machine.publish_available().await;

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");

    machine.shutdown().await;
    sampler.stop().await;
    dispatch.abort();

    log::info!("Exiting");

    Ok(())
}

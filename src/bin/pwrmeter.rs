use clap::{App, Arg};
use colored::*;
use embedded_hal::spi::SpiDevice;
use pwrmeter::config::{Configuration, Overrides, DEFAULT_CONFIG_PATH};
use pwrmeter::meter::{Meter, MeterSettings};
use pwrmeter::publisher::{qos_from_level, MqttPublisher};
use pwrmeter::scheduler::{self, Cadence};
use std::time::Duration;
use tracing::{info, Level};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("pwrmeter")
        .version("0.1.0")
        .author("Power Systems Engineering Team")
        .about("Supply-rail meter: SPI ADC to MQTT telemetry and band alerts")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Configuration file")
                .takes_value(true)
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Verbose mode (debug logging)"),
        )
        .arg(
            Arg::with_name("logger")
                .short("l")
                .long("logger")
                .help("Logger mode (log every snapshot)"),
        )
        .arg(
            Arg::with_name("timer")
                .short("t")
                .long("timer")
                .value_name("SECONDS")
                .help("Seconds between cycles, 0 runs back to back")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Timer must be a whole number of seconds".into()),
                }),
        )
        .get_matches();

    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);
    let mut config = match Configuration::load(config_path) {
        Ok(config) => config,
        Err(e) => fatal("config_error", &e),
    };
    config.apply(&Overrides {
        verbose: matches.is_present("verbose"),
        logger: matches.is_present("logger"),
        timer_seconds: matches.value_of("timer").and_then(|v| v.parse().ok()),
    });

    let level = if config.basic_verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
    info!(path = %config_path, ?config, "configuration loaded");

    let bus = match open_bus(&config.spi_device) {
        Ok(bus) => bus,
        Err(e) => fatal("open_error", &e),
    };

    run(bus, config).await
}

#[cfg(feature = "linux-spi")]
fn open_bus(path: &str) -> std::io::Result<linux_embedded_hal::SpidevDevice> {
    pwrmeter::spidev::open(path)
}

#[cfg(not(feature = "linux-spi"))]
fn open_bus(path: &str) -> std::io::Result<NoBus> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot open {path}: built without the linux-spi feature"),
    ))
}

/// Stand-in bus type for builds without a hardware transport.
#[cfg(not(feature = "linux-spi"))]
enum NoBus {}

#[cfg(not(feature = "linux-spi"))]
impl embedded_hal::spi::ErrorType for NoBus {
    type Error = embedded_hal::spi::ErrorKind;
}

#[cfg(not(feature = "linux-spi"))]
impl SpiDevice for NoBus {
    fn transaction(
        &mut self,
        _operations: &mut [embedded_hal::spi::Operation<'_, u8>],
    ) -> Result<(), Self::Error> {
        match *self {}
    }
}

async fn run<B: SpiDevice>(bus: B, config: Configuration) -> Result<(), Box<dyn std::error::Error>> {
    let qos = qos_from_level(config.qos).unwrap_or(rumqttc::QoS::AtMostOnce);
    let publisher = match MqttPublisher::connect(&config.mqtt_address, &config.client_id, qos, CONNECT_TIMEOUT).await {
        Ok(publisher) => publisher,
        Err(e) => fatal("connect_error", &e),
    };

    let settings = MeterSettings {
        device_name: config.resolve_device_name(),
        telemetry_topic: config.mqtt_topic.clone(),
        alert_format: config.alert_format,
        read_failure: config.read_failure,
        log_snapshots: config.basic_logger,
    };
    info!(device = %settings.device_name, topic = %settings.telemetry_topic, "meter ready");

    let mut meter = Meter::new(bus, publisher, settings);
    let cadence = Cadence::from_interval(config.interval());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let result = scheduler::run(&mut meter, cadence, shutdown).await;
    let (_bus, publisher) = meter.into_parts();
    publisher.disconnect().await;

    match result {
        Ok(()) => {
            println!("{}", "meter stopped".bright_green());
            Ok(())
        }
        Err(e) => fatal("spi-io", &e),
    }
}

fn fatal(context: &str, error: &dyn std::error::Error) -> ! {
    eprintln!("{} {}: {}", "error".bright_red().bold(), context, error);
    std::process::exit(1);
}

extern crate pretty_env_logger;
#[macro_use]
extern crate log;

use std::net::IpAddr;

use bgh_local_climate::climate::types::{AcMode, ClimateConfig, FanSpeed};
use bgh_local_climate::climate::Climate;
use color_eyre::eyre::WrapErr;
use structopt::StructOpt;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

#[derive(StructOpt, Debug)]
struct UnitOpt {
    /// Name of the unit, used in log output
    #[structopt(short, long, default_value = "bgh")]
    name: String,

    /// IP address of the unit
    #[structopt(short, long)]
    address: IpAddr,

    /// UDP port the unit listens on
    #[structopt(long, default_value = "20910")]
    port: u16,

    /// Local UDP port replies arrive on
    #[structopt(long, default_value = "20911")]
    local_port: u16,
}

impl UnitOpt {
    fn config(&self) -> ClimateConfig {
        let mut config = ClimateConfig::new(self.name.clone(), self.address);
        config.port = self.port;
        config.local_port = self.local_port;
        config
    }
}

#[derive(StructOpt, Debug)]
enum Opt {
    /// Poll the unit and print its state
    Status {
        #[structopt(flatten)]
        unit: UnitOpt,

        /// Number of readings
        #[structopt(short, long, default_value = "1")]
        times: usize,
    },
    /// Print every state update as it is published
    Watch {
        #[structopt(flatten)]
        unit: UnitOpt,
    },
    /// Change mode, fan speed and/or target temperature
    Set {
        #[structopt(flatten)]
        unit: UnitOpt,

        /// Operating mode (off, cool, heat, dry, fan_only, auto)
        #[structopt(short, long)]
        mode: Option<AcMode>,

        /// Fan speed (low, medium, high, auto)
        #[structopt(short, long)]
        fan: Option<FanSpeed>,

        /// Target temperature in degrees celsius
        #[structopt(short, long)]
        temperature: Option<f32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    color_eyre::install()?;

    let opts = Opt::from_args();

    debug!("opts: {:?}", opts);

    match opts {
        Opt::Status { unit, times } => {
            let climate = Climate::start(unit.config())
                .await
                .wrap_err("Could not start climate session")?;
            for _ in 0..times {
                climate.poll().await?;
                println!("{}", climate.status());
            }
            climate.stop();
        }
        Opt::Watch { unit } => {
            let climate = Climate::start(unit.config())
                .await
                .wrap_err("Could not start climate session")?;
            let mut updates = WatchStream::new(climate.subscribe());
            while let Some(status) = updates.next().await {
                println!("{}", status);
            }
        }
        Opt::Set {
            unit,
            mode,
            fan,
            temperature,
        } => {
            let climate = Climate::start(unit.config())
                .await
                .wrap_err("Could not start climate session")?;
            if let Some(mode) = mode {
                climate.set_mode(mode).await?;
            }
            if let Some(fan) = fan {
                climate.set_fan_speed(fan).await?;
            }
            if let Some(temperature) = temperature {
                climate.set_target_temperature(temperature).await?;
            }
            println!("{}", climate.status());
            climate.stop();
        }
    }

    Ok(())
}

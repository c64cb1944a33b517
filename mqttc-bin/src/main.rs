use std::time::Duration;

use anyhow::{anyhow, Result};
use structopt::StructOpt;

use mqttc::{Client, Options, QoS, SubscribeReturnCode};

mod logger;
mod settings;

use settings::Settings;

#[derive(StructOpt, Debug)]
#[structopt(name = "mqttc", about = "MQTT v3.1.1 command line client")]
struct Args {
    /// Config filename
    #[structopt(name = "config", short = "f", long)]
    cfg_name: Option<String>,

    /// Broker address: mqtt://, mqtts://, ws:// or wss://, or a bare host:port
    #[structopt(long)]
    url: Option<String>,

    /// Client id, a random one is generated when neither this nor the config sets it
    #[structopt(name = "client-id", short = "i", long)]
    client_id: Option<String>,

    /// Keepalive in seconds, 0 disables
    #[structopt(short = "k", long)]
    keepalive: Option<u64>,

    #[structopt(short = "u", long)]
    username: Option<String>,

    #[structopt(short = "P", long)]
    password: Option<String>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Publish one message and exit
    Pub {
        #[structopt(short = "t", long)]
        topic: String,
        #[structopt(short = "m", long)]
        message: String,
        #[structopt(short = "q", long, default_value = "0")]
        qos: u8,
        #[structopt(short = "r", long)]
        retain: bool,
    },
    /// Subscribe and print `topic: payload` until interrupted
    Sub {
        #[structopt(short = "t", long = "topic", required = true)]
        topics: Vec<String>,
        #[structopt(short = "q", long, default_value = "0")]
        qos: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::from_args();
    let settings = Settings::load(args.cfg_name.as_deref())?;

    logger::logger_init(logger::config_logger(&settings.log), settings.log.level.inner())?;

    let url = args.url.clone().unwrap_or_else(|| settings.url.clone());
    let opts = client_options(&args, settings.client);

    let client = Client::new();
    client.on_log(|msg| log::trace!("{msg}"));
    client.connect(&url, opts).await?.wait(Duration::ZERO).await?;

    match args.cmd {
        Command::Pub { topic, message, qos, retain } => {
            client.publish(&topic, message, to_qos(qos)?, retain).await?.wait(Duration::ZERO).await?;
            log::info!("published to {topic}");
        }
        Command::Sub { topics, qos } => {
            client.on_message(|topic, payload| println!("{topic}: {}", String::from_utf8_lossy(payload)));
            let qos = to_qos(qos)?;
            let filters = topics.iter().map(|t| (t.as_str(), qos)).collect::<Vec<_>>();
            let codes = client.subscribe_many(&filters).await?.wait(Duration::ZERO).await?;
            for (topic, code) in topics.iter().zip(codes) {
                match code {
                    SubscribeReturnCode::Success(qos) => log::info!("subscribed to {topic}, qos {}", qos.value()),
                    SubscribeReturnCode::Failure => log::warn!("subscribe to {topic} refused"),
                }
            }
            tokio::signal::ctrl_c().await?;
        }
    }

    client.disconnect().await?;
    Ok(())
}

fn client_options(args: &Args, mut opts: Options) -> Options {
    if let Some(client_id) = &args.client_id {
        opts.client_id = client_id.clone();
    }
    if opts.client_id.is_empty() {
        opts.client_id = format!("mqttc-{:08x}", rand::random::<u32>());
    }
    if let Some(keepalive) = args.keepalive {
        opts.keepalive = Duration::from_secs(keepalive);
    }
    if let Some(username) = &args.username {
        opts.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        opts.password = Some(password.clone());
    }
    opts
}

fn to_qos(qos: u8) -> Result<QoS> {
    QoS::try_from(qos).map_err(|_| anyhow!("invalid qos {qos}, expected 0, 1 or 2"))
}

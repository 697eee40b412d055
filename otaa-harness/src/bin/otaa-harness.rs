//! OTAA conformance harness.
//!
//! ```bash
//! cargo run -p otaa-harness --bin otaa-harness -- --conf conf/test_harness.conf
//! ```
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use otaa_harness::config::{Config, DEFAULT_CONF_FILE};
use otaa_harness::{logging, Configuration, Forwarder, JoinServer, Server};
use rand_core::OsRng;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "otaa-harness")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Harness configuration file. Device tables are read from its directory.
    #[arg(long, default_value = DEFAULT_CONF_FILE)]
    conf: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.conf)?;
    logging::init(&config.log_config())?;
    logging::log_banner();

    let region = config.region()?;
    let plan = Configuration::new(region);
    let mut join = JoinServer::new(plan.clone(), OsRng);
    for app in config.load_applications()? {
        join.add_application(app)?;
    }

    let forwarder = Forwarder::bind(config.listen_addr(), plan)
        .await
        .with_context(|| format!("cannot listen on {}", config.listen_addr()))?;
    info!("Region {}, NetID 0x{:06x}", region, config.net_id);

    let mut server = Server::new(forwarder, join);
    server.run().await?;
    Ok(())
}

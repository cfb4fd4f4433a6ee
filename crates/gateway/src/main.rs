use bg_gateway::cli::{Cli, Commands};
use bg_gateway::config::GatewayConfig;
use bg_gateway::{health, logging, server, supervise};
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let outcome = match cli.command {
		Commands::Serve(args) => server::serve(GatewayConfig::resolve(&args)).await.map(|()| 0),
		Commands::Supervise(args) => supervise::run(GatewayConfig::resolve(&args)).await,
		Commands::Health(args) => {
			let config = GatewayConfig::resolve(&bg_gateway::cli::ServeArgs {
				port: args.port,
				run_dir: args.run_dir,
				..Default::default()
			});
			let verdict = health::run_health_check(config.port, &config.run_dir).await;
			match serde_json::to_string(&verdict) {
				Ok(json) => println!("{json}"),
				Err(err) => error!(target = "bg.gateway", error = %err, "failed to serialize health verdict"),
			}
			Ok(if verdict.healthy { 0 } else { 1 })
		}
	};

	match outcome {
		Ok(code) => std::process::exit(code),
		Err(err) => {
			error!(target = "bg.gateway", error = %err, "gateway failed");
			std::process::exit(1);
		}
	}
}

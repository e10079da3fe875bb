use std::path::PathBuf;

use clap::Parser;

use bedrock_relay::config::{Config, Overrides};

#[derive(Parser, Debug)]
#[command(name = "bedrock-relay", about = "OpenAI-compatible proxy for Anthropic models on AWS Bedrock", long_about = None)]
struct Cli {
	/// Read configuration from a JSON file
	#[arg(short, long, value_name = "file")]
	file: Option<PathBuf>,

	/// Bind address
	#[arg(long)]
	host: Option<String>,

	/// Bind port
	#[arg(long)]
	port: Option<u16>,

	/// AWS region for Bedrock
	#[arg(long)]
	region: Option<String>,

	/// Static API key for northbound auth
	#[arg(long, value_name = "key")]
	api_key: Option<String>,

	/// Model cache TTL in seconds
	#[arg(long, value_name = "secs")]
	model_cache_ttl: Option<u64>,

	/// Per-attempt completion timeout in seconds
	#[arg(long, value_name = "secs")]
	request_timeout: Option<u64>,

	/// Per-attempt model-listing timeout in seconds
	#[arg(long, value_name = "secs")]
	models_timeout: Option<u64>,

	/// Maximum outbound retry attempts
	#[arg(long)]
	max_retries: Option<u32>,

	/// Log verbosity (trace|debug|info|warn|error)
	#[arg(long)]
	log_level: Option<String>,
}

pub fn run() -> anyhow::Result<()> {
	let cli = Cli::parse();
	let overrides = Overrides {
		file: cli.file,
		host: cli.host,
		port: cli.port,
		region: cli.region,
		api_key: cli.api_key,
		model_cache_ttl_secs: cli.model_cache_ttl,
		request_timeout_secs: cli.request_timeout,
		models_timeout_secs: cli.models_timeout,
		log_level: cli.log_level,
		max_retries: cli.max_retries,
	};
	let config = Config::load(&overrides)?;
	bedrock_relay::telemetry::init(&config.log_level);

	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?
		.block_on(bedrock_relay::proxy::serve(config))
}

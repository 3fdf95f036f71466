#![allow(missing_docs)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cmd::Protocol;

mod cmd;

#[derive(Parser)]
#[command(name = "bondrt", about = "Schema-driven Bond payload inspection and conversion")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Summarize a JSON schema.
	Schema {
		path: PathBuf,
		#[arg(long = "struct")]
		struct_name: Option<String>,
	},
	/// Deserialize a payload and print it.
	Decode {
		schema: PathBuf,
		payload: PathBuf,
		#[arg(long, value_enum)]
		protocol: Protocol,
		#[arg(long = "struct")]
		struct_name: Option<String>,
		#[arg(long)]
		json: bool,
	},
	/// Convert a payload between protocols.
	Transcode {
		schema: PathBuf,
		payload: PathBuf,
		#[arg(long, value_enum)]
		from: Protocol,
		#[arg(long, value_enum)]
		to: Protocol,
		#[arg(long)]
		out: PathBuf,
		#[arg(long = "struct")]
		struct_name: Option<String>,
	},
}

fn main() {
	init_tracing();
	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn init_tracing() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
	let _ = tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.try_init();
}

fn run() -> bondrt::codec::Result<()> {
	let cli = Cli::parse();

	match cli.command {
		Commands::Schema { path, struct_name } => cmd::schema::run(path, struct_name),
		Commands::Decode {
			schema,
			payload,
			protocol,
			struct_name,
			json,
		} => cmd::decode::run(cmd::decode::DecodeArgs {
			schema,
			payload,
			protocol: protocol.into(),
			struct_name,
			json,
		}),
		Commands::Transcode {
			schema,
			payload,
			from,
			to,
			out,
			struct_name,
		} => cmd::transcode::run(cmd::transcode::TranscodeArgs {
			schema,
			payload,
			from: from.into(),
			to: to.into(),
			out,
			struct_name,
		}),
	}
}

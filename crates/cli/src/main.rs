//! Command Line Interface for watching Solana balances.
use anyhow::{Context, Result};
use balance_watch_domain::{TokenProgram, WatchError};
use balance_watch_execution::prelude::*;
use balance_watch_protocols::prelude::{BalanceRpc, RpcConfig, RpcProvider};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "balance-watch")]
#[command(about = "Watch Solana native and token balances in slot order", long_about = None)]
struct Cli {
    /// HTTP RPC endpoint (overrides SOLANA_RPC_URL; the websocket endpoint
    /// is derived from it unless --ws-url or SOLANA_WS_URL is set)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Websocket endpoint (overrides SOLANA_WS_URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Print updates as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the lamport balance of an address
    Native {
        /// Account address
        address: String,
    },
    /// Watch an owner's balance of a token
    Token {
        /// Wallet owning the token account
        #[arg(long)]
        owner: String,

        /// Token mint
        #[arg(long)]
        mint: String,

        /// Token program family
        #[arg(long, value_enum, default_value_t = ProgramArg::Token)]
        program: ProgramArg,

        /// Decimals reported while the token account does not exist
        /// (defaults to the mint's decimals)
        #[arg(long)]
        decimals: Option<u8>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgramArg {
    Token,
    #[value(name = "token-2022")]
    Token2022,
}

impl From<ProgramArg> for TokenProgram {
    fn from(arg: ProgramArg) -> Self {
        match arg {
            ProgramArg::Token => TokenProgram::Token,
            ProgramArg::Token2022 => TokenProgram::Token2022,
        }
    }
}

#[derive(Serialize)]
struct UpdateLine<'a, V> {
    account: &'a str,
    balance: &'a V,
}

fn report<V: Display + Serialize>(json: bool, account: &str, event: Result<V, WatchError>) {
    match event {
        Ok(balance) if json => {
            let line = UpdateLine {
                account,
                balance: &balance,
            };
            match serde_json::to_string(&line) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("{account}: cannot encode update: {e}"),
            }
        }
        Ok(balance) => println!("{account}: {balance}"),
        Err(e) => eprintln!("{account}: {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let mut config = RpcConfig::from_env().context("invalid RPC configuration")?;
    if let Some(rpc_url) = cli.rpc_url {
        config = config.with_rpc_url(rpc_url)?;
    }
    if let Some(ws_url) = cli.ws_url {
        config = config.with_ws_url(ws_url);
    }
    info!(rpc_url = %config.rpc_url, ws_url = %config.ws_url, "Using RPC endpoints");

    let rpc: Arc<dyn BalanceRpc> = Arc::new(RpcProvider::new(config));
    let json = cli.json;

    let handle = match cli.command {
        Commands::Native { address } => {
            let label = address.clone();
            NativeBalanceWatcher::native(rpc)
                .watch(address, move |event| report(json, &label, event))
        }
        Commands::Token {
            owner,
            mint,
            program,
            decimals,
        } => {
            let config = TokenWatchConfig {
                missing_account_decimals: decimals
                    .map(MissingAccountDecimals::Fixed)
                    .unwrap_or_default(),
            };
            let label = format!("{owner}/{mint}");
            TokenBalanceWatcher::token(rpc, config).watch(
                TokenTarget::new(owner, mint, program.into()),
                move |event| report(json, &label, event),
            )
        }
    };

    let canceller = handle.canceller();
    let session = handle.join();
    tokio::pin!(session);

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Interrupted, cancelling watch");
            canceller.cancel();
            session.await;
        }
        _ = &mut session => {
            info!("Watch session ended");
        }
    }

    Ok(())
}

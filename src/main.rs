// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use ethers::types::Address;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use zk_smart_account::chain::{ChainClient, EthersChainClient};
use zk_smart_account::rpc::{WalletRpcImpl, WalletRpcServer};
use zk_smart_account::{DeploymentConfig, LocalWalletSigner, SignatureScheme, SmartAccountClient};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, env = "RPC_SERVER_ADDR", default_value = "127.0.0.1:8545")]
    rpc_server_addr: String,

    /// Owner key of the smart account
    #[clap(short, long, env = "PRIVATE_KEY")]
    private_key: String,

    #[clap(short, long, env = "CHAIN_ID", default_value_t = 11124)]
    chain_id: u64,

    #[clap(short, long, env = "ETH_RPC_URL")]
    eth_rpc_url: String,

    #[clap(long, env = "FACTORY_ADDRESS", default_value = "0x00a24Fe53755256c07E6e36Ffff1Efa53F9f7C06")]
    factory: Address,

    #[clap(long, env = "VALIDATOR_ADDRESS", default_value = "0xF42488Ef821f39858AB71a70F8C1485a2A45AE7A")]
    validator: Address,

    #[clap(long, env = "BATCH_CALLER_ADDRESS")]
    batch_caller: Address,

    /// sign-message, typed-transaction or raw-digest
    #[clap(long, env = "SIGNATURE_SCHEME", default_value = "sign-message")]
    signature_scheme: SignatureScheme,

    #[clap(long, env = "STRICT_DEPLOYMENT_PROBE")]
    strict_deployment_probe: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = DeploymentConfig::new(args.chain_id, args.factory, args.validator, args.batch_caller)
        .with_signature_scheme(args.signature_scheme)
        .with_strict_deployment_probe(args.strict_deployment_probe);

    let chain = Arc::new(EthersChainClient::from_url(&args.eth_rpc_url)?);
    match chain.chain_id().await {
        Ok(connected) if connected != config.chain_id => warn!(
            "Configured for chain {} but {} reports chain {}, broadcasts will be refused",
            config.chain_id, args.eth_rpc_url, connected
        ),
        Ok(_) => {}
        Err(e) => warn!("Could not read chain id: {}", e),
    }

    let signer = LocalWalletSigner::from_private_key(&args.private_key, config.chain_id)?;
    let client = SmartAccountClient::new(chain, config, Some(Arc::new(signer)));
    info!(
        "Smart account for owner {:?}: {:?}",
        client.owner()?,
        client.smart_account_address().await?
    );

    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    info!("Starting smart account wallet RPC server on {}", server_addr);
    let server_handle = start_server(server_addr, WalletRpcImpl::new(Arc::new(client))).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

async fn start_server<C: ChainClient + 'static>(
    server_addr: SocketAddr,
    wallet_rpc: WalletRpcImpl<C>,
) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;
    let server_handle = server.start(wallet_rpc.into_rpc());

    Ok(server_handle)
}
